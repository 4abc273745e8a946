use crate::demo::{run_demo, run_queue, DemoArgs, QueueArgs};
use crate::server;
use amvali_portal::error::AppError;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "AMVALI Project Portal",
    about = "Run the regional infrastructure project portal or explore it from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Seed the reference municipalities and projects and print a portal walkthrough
    Demo(DemoArgs),
    /// Print the ranked technical queue for the seeded portal
    Queue(QueueArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Load the reference demo data before accepting requests
    #[arg(long)]
    pub(crate) seed: bool,
    /// Municipality roster CSV used when seeding
    #[arg(long, requires = "seed")]
    pub(crate) municipalities_csv: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args),
        Command::Queue(args) => run_queue(args),
    }
}
