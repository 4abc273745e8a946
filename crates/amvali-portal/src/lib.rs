//! Regional infrastructure project portal: admission control, IPR scoring, delivery workflow,
//! and the technical prioritization queue.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
