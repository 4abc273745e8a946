//! Municipal infrastructure project intake, admission control, and delivery tracking.
//!
//! Submissions pass the star-budget and concurrency gates inside the repository's admission
//! transaction, then move through six fixed stages. Status and progress are always derived from
//! the stage track; the technical queue is a read-side ranking over projects in validation or
//! execution.

pub mod admission;
pub mod advisory;
pub mod domain;
pub mod import;
pub mod memory;
pub mod queue;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;
pub mod stages;

#[cfg(test)]
pub(crate) mod tests;

pub use admission::{AdmissionController, AdmissionRejection};
pub use advisory::{
    AdvisoryError, AdvisoryGateway, AllocationBrief, AllocationSuggestion, ComplexityDiagnosis,
    ProjectAdvisor, ProjectBrief, TeamCandidate,
};
pub use domain::{
    Complexity, EngagementProfile, EngagementUpdate, InboxEntry, Municipality, MunicipalityId,
    MunicipalityRegistration, Notification, NotificationId, NotificationKind, PriorityWeight,
    Project, ProjectCategory, ProjectId, ProjectStatus, ProjectSubmission, ProjectUpdate,
    ScoringInputs, Stage, StageKind, StageStatus, Technician, TechnicianId,
    TechnicianRegistration, ValidationError, STAGE_COUNT, STAR_BUDGET_CAP,
};
pub use import::{MunicipalityImportError, MunicipalityImporter};
pub use memory::{InMemoryNotificationOutbox, InMemoryPortalRepository};
pub use queue::{PrioritizationQueue, QueueEntry, QueueError};
pub use repository::{
    NotificationError, NotificationInbox, NotificationPublisher, PortalRepository, ProjectFilter,
    RepositoryError, INBOX_PAGE_SIZE,
};
pub use router::{notification_router, portal_router};
pub use scoring::ipr_score;
pub use service::{
    DiagnosisOutcome, PortalServiceError, ProjectPortalService, StageUpdate, TeamMemberView,
};
pub use stages::{StageTransition, WorkflowError, WorkflowStateMachine};
