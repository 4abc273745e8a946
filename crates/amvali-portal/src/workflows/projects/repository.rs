use serde::Deserialize;

use super::domain::{
    InboxEntry, Municipality, MunicipalityId, Notification, NotificationId, Project, ProjectId,
    ProjectStatus, Technician, TechnicianId,
};

/// Read filter for project listings. Empty `statuses` matches every status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProjectFilter {
    #[serde(default)]
    pub statuses: Vec<ProjectStatus>,
    #[serde(default)]
    pub municipality_id: Option<MunicipalityId>,
}

impl ProjectFilter {
    pub fn with_statuses(statuses: &[ProjectStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            municipality_id: None,
        }
    }

    pub fn matches(&self, project: &Project) -> bool {
        let status_ok = self.statuses.is_empty() || self.statuses.contains(&project.status);
        let owner_ok = self
            .municipality_id
            .as_ref()
            .map_or(true, |id| &project.municipality_id == id);
        status_ok && owner_ok
    }
}

/// Persistence collaborator. Implementations provide the transactional primitives the
/// admission and workflow rules rely on.
pub trait PortalRepository: Send + Sync {
    fn insert_municipality(&self, municipality: Municipality)
        -> Result<Municipality, RepositoryError>;
    fn municipality(&self, id: &MunicipalityId) -> Result<Option<Municipality>, RepositoryError>;
    fn municipalities(&self) -> Result<Vec<Municipality>, RepositoryError>;

    /// Admission transaction. `admit` receives the municipality and its projects while the
    /// municipality is locked against other admissions; its municipality edits and the returned
    /// project are committed together, or nothing is written when it fails.
    fn admit_project<E, F>(&self, municipality_id: &MunicipalityId, admit: F) -> Result<Project, E>
    where
        F: FnOnce(&mut Municipality, &[Project]) -> Result<Project, E>,
        E: From<RepositoryError>;

    /// Apply `update` to a municipality under its lock.
    fn update_municipality<F>(
        &self,
        id: &MunicipalityId,
        update: F,
    ) -> Result<Municipality, RepositoryError>
    where
        F: FnOnce(&mut Municipality);

    fn project(&self, id: &ProjectId) -> Result<Option<Project>, RepositoryError>;
    fn projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>, RepositoryError>;

    /// Serialized per-project edit; the project is only written back when `apply` succeeds.
    fn update_project<T, E, F>(&self, id: &ProjectId, apply: F) -> Result<(Project, T), E>
    where
        F: FnOnce(&mut Project) -> Result<T, E>,
        E: From<RepositoryError>;

    /// Per-project edit that may also change the owning municipality. The municipality lock is
    /// taken before the project lock, matching admission, and both drafts are written together
    /// only when `apply` succeeds.
    fn update_project_with_owner<T, E, F>(
        &self,
        id: &ProjectId,
        apply: F,
    ) -> Result<(Project, Municipality, T), E>
    where
        F: FnOnce(&mut Project, &mut Municipality) -> Result<T, E>,
        E: From<RepositoryError>;

    fn queue_pins(&self) -> Result<Vec<ProjectId>, RepositoryError>;
    fn set_queue_pins(&self, pins: Vec<ProjectId>) -> Result<(), RepositoryError>;

    fn insert_technician(&self, technician: Technician) -> Result<Technician, RepositoryError>;
    fn technician(&self, id: &TechnicianId) -> Result<Option<Technician>, RepositoryError>;
    fn technicians(&self) -> Result<Vec<Technician>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Notification collaborator. Delivery is fire-and-forget from the workflow's point of view.
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notification: Notification) -> Result<(), NotificationError>;
}

/// Read side of the notification store.
pub trait NotificationInbox: Send + Sync {
    /// Newest first, at most [`INBOX_PAGE_SIZE`] entries.
    fn notifications_for(&self, recipient_id: &str) -> Result<Vec<InboxEntry>, NotificationError>;
    fn mark_read(&self, id: &NotificationId) -> Result<InboxEntry, NotificationError>;
}

pub const INBOX_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
    #[error("notification {0} not found")]
    NotFound(NotificationId),
}
