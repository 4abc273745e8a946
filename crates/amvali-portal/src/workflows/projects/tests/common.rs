use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::response::Response;
use chrono::Utc;
use serde_json::Value;

use crate::config::AdvisoryConfig;
use crate::workflows::projects::advisory::{
    AdvisoryError, AllocationBrief, AllocationSuggestion, ComplexityDiagnosis, ProjectAdvisor,
    ProjectBrief,
};
use crate::workflows::projects::domain::{
    stage_template, Complexity, EngagementProfile, Municipality, MunicipalityId,
    MunicipalityRegistration, Notification, PriorityWeight, Project, ProjectCategory, ProjectId,
    ProjectStatus, ProjectSubmission, ScoringInputs, Technician, TechnicianId,
    TechnicianRegistration,
};
use crate::workflows::projects::memory::InMemoryPortalRepository;
use crate::workflows::projects::repository::{
    NotificationError, NotificationPublisher, PortalRepository, ProjectFilter, RepositoryError,
};
use crate::workflows::projects::{portal_router, ProjectPortalService};

static FIXTURE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

pub(crate) fn municipality(id: &str) -> Municipality {
    Municipality {
        id: MunicipalityId(id.to_string()),
        name: format!("Município {id}"),
        code: id.to_ascii_uppercase(),
        contact_email: format!("obras@{id}.sc.gov.br"),
        contact_phone: None,
        engagement: EngagementProfile::default(),
        active_stars: BTreeMap::new(),
        total_projects: 0,
        completed_projects: 0,
        created_at: Utc::now(),
    }
}

/// Fresh project in `solicitacao` with a unique id; bypasses admission.
pub(crate) fn project_for(municipality_id: &str, category: ProjectCategory, weight: u8) -> Project {
    let sequence = FIXTURE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let scoring = ScoringInputs {
        impact: 7,
        urgency: 6,
        cost: 5,
        complexity: None,
    };
    let now = Utc::now();
    Project {
        id: ProjectId(format!("fixture-{sequence:04}")),
        title: format!("Obra {sequence}"),
        description: "Recuperação de via urbana".to_string(),
        category,
        municipality_id: MunicipalityId(municipality_id.to_string()),
        municipality_name: format!("Município {municipality_id}"),
        priority_weight: PriorityWeight::new(weight).expect("fixture weight in range"),
        ipr_score: scoring.score(),
        scoring,
        status: ProjectStatus::Solicitacao,
        progress_percent: 0.0,
        stages: stage_template(),
        assigned_team: Vec::new(),
        location: None,
        scope: None,
        purpose: None,
        estimated_deadline: None,
        advisory_diagnosis: None,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn registration(code: &str) -> MunicipalityRegistration {
    MunicipalityRegistration {
        name: format!("Município {code}"),
        code: code.to_string(),
        contact_email: format!("obras@{}.sc.gov.br", code.to_ascii_lowercase()),
        contact_phone: Some("(47) 3300-0000".to_string()),
    }
}

pub(crate) fn submission(
    municipality_id: &MunicipalityId,
    category: ProjectCategory,
    weight: u8,
) -> ProjectSubmission {
    ProjectSubmission {
        title: "Pavimentação da Rua das Flores".to_string(),
        description: "Pavimentação asfáltica de 1,2 km".to_string(),
        category,
        municipality_id: municipality_id.clone(),
        priority_weight: PriorityWeight::new(weight).expect("fixture weight in range"),
        impact: 7,
        urgency: 6,
        cost: 5,
        location: Some("Centro".to_string()),
        scope: None,
        purpose: None,
    }
}

pub(crate) fn technician(name: &str) -> TechnicianRegistration {
    TechnicianRegistration {
        name: name.to_string(),
        email: format!("{}@amvali.org.br", name.to_ascii_lowercase()),
        specialties: vec![ProjectCategory::Pavimentacao],
        workload_hours: 40,
    }
}

pub(crate) type MemoryService =
    ProjectPortalService<InMemoryPortalRepository, MemoryNotifier, ScriptedAdvisor>;

pub(crate) fn build_service_with(
    advisor: ScriptedAdvisor,
) -> (MemoryService, Arc<InMemoryPortalRepository>, Arc<MemoryNotifier>) {
    let repository = Arc::new(InMemoryPortalRepository::default());
    let notifier = Arc::new(MemoryNotifier::default());
    let service = ProjectPortalService::new(
        repository.clone(),
        notifier.clone(),
        Arc::new(advisor),
        AdvisoryConfig {
            timeout: Duration::from_millis(200),
        },
    );
    (service, repository, notifier)
}

pub(crate) fn build_service() -> (MemoryService, Arc<InMemoryPortalRepository>, Arc<MemoryNotifier>)
{
    build_service_with(ScriptedAdvisor::answering(Complexity::Alta, 0.9))
}

pub(crate) fn portal_router_with_service(service: MemoryService) -> axum::Router {
    portal_router(Arc::new(service))
}

#[derive(Default, Clone)]
pub(crate) struct MemoryNotifier {
    events: Arc<Mutex<Vec<Notification>>>,
}

impl MemoryNotifier {
    pub(crate) fn events(&self) -> Vec<Notification> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

impl NotificationPublisher for MemoryNotifier {
    fn publish(&self, notification: Notification) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub(crate) struct FailingNotifier;

impl NotificationPublisher for FailingNotifier {
    fn publish(&self, _notification: Notification) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp offline".to_string()))
    }
}

#[derive(Debug, Clone)]
enum Script {
    Answer(Complexity, f32),
    Fail,
    Stall,
}

/// Advisor double with a fixed answer, a fixed failure, or a call that never resolves.
#[derive(Debug, Clone)]
pub(crate) struct ScriptedAdvisor {
    script: Script,
    team: Vec<TechnicianId>,
}

impl ScriptedAdvisor {
    pub(crate) fn answering(complexity: Complexity, confidence: f32) -> Self {
        Self {
            script: Script::Answer(complexity, confidence),
            team: Vec::new(),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            script: Script::Fail,
            team: Vec::new(),
        }
    }

    pub(crate) fn stalled() -> Self {
        Self {
            script: Script::Stall,
            team: Vec::new(),
        }
    }

    pub(crate) fn suggesting(mut self, team: Vec<TechnicianId>) -> Self {
        self.team = team;
        self
    }
}

impl ProjectAdvisor for ScriptedAdvisor {
    async fn diagnose_complexity(
        &self,
        brief: ProjectBrief,
    ) -> Result<ComplexityDiagnosis, AdvisoryError> {
        match &self.script {
            Script::Answer(complexity, confidence) => Ok(ComplexityDiagnosis {
                complexity: *complexity,
                justification: format!("{} exige projeto estrutural", brief.title),
                confidence: *confidence,
                recommendations: vec!["Levantamento topográfico".to_string()],
                low_confidence: false,
            }),
            Script::Fail => Err(AdvisoryError::Unavailable("quota exhausted".to_string())),
            Script::Stall => std::future::pending().await,
        }
    }

    async fn suggest_allocation(
        &self,
        _brief: AllocationBrief,
    ) -> Result<AllocationSuggestion, AdvisoryError> {
        match &self.script {
            Script::Answer(..) => Ok(AllocationSuggestion {
                suggested_team: self.team.clone(),
                reasoning: "Especialidade compatível e carga disponível".to_string(),
                workload_impact: Some("moderado".to_string()),
                low_confidence: false,
            }),
            Script::Fail => Err(AdvisoryError::Malformed("not json".to_string())),
            Script::Stall => std::future::pending().await,
        }
    }
}

pub(crate) struct UnavailableRepository;

fn offline() -> RepositoryError {
    RepositoryError::Unavailable("database offline".to_string())
}

impl PortalRepository for UnavailableRepository {
    fn insert_municipality(
        &self,
        _municipality: Municipality,
    ) -> Result<Municipality, RepositoryError> {
        Err(offline())
    }

    fn municipality(&self, _id: &MunicipalityId) -> Result<Option<Municipality>, RepositoryError> {
        Err(offline())
    }

    fn municipalities(&self) -> Result<Vec<Municipality>, RepositoryError> {
        Err(offline())
    }

    fn admit_project<E, F>(&self, _municipality_id: &MunicipalityId, _admit: F) -> Result<Project, E>
    where
        F: FnOnce(&mut Municipality, &[Project]) -> Result<Project, E>,
        E: From<RepositoryError>,
    {
        Err(offline().into())
    }

    fn update_municipality<F>(
        &self,
        _id: &MunicipalityId,
        _update: F,
    ) -> Result<Municipality, RepositoryError>
    where
        F: FnOnce(&mut Municipality),
    {
        Err(offline())
    }

    fn project(&self, _id: &ProjectId) -> Result<Option<Project>, RepositoryError> {
        Err(offline())
    }

    fn projects(&self, _filter: &ProjectFilter) -> Result<Vec<Project>, RepositoryError> {
        Err(offline())
    }

    fn update_project<T, E, F>(&self, _id: &ProjectId, _apply: F) -> Result<(Project, T), E>
    where
        F: FnOnce(&mut Project) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        Err(offline().into())
    }

    fn update_project_with_owner<T, E, F>(
        &self,
        _id: &ProjectId,
        _apply: F,
    ) -> Result<(Project, Municipality, T), E>
    where
        F: FnOnce(&mut Project, &mut Municipality) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        Err(offline().into())
    }

    fn queue_pins(&self) -> Result<Vec<ProjectId>, RepositoryError> {
        Err(offline())
    }

    fn set_queue_pins(&self, _pins: Vec<ProjectId>) -> Result<(), RepositoryError> {
        Err(offline())
    }

    fn insert_technician(&self, _technician: Technician) -> Result<Technician, RepositoryError> {
        Err(offline())
    }

    fn technician(&self, _id: &TechnicianId) -> Result<Option<Technician>, RepositoryError> {
        Err(offline())
    }

    fn technicians(&self) -> Result<Vec<Technician>, RepositoryError> {
        Err(offline())
    }
}

/// In-memory store whose combined project and municipality writes can be made to fail after
/// the edit has been applied, as a lost commit would.
#[derive(Default)]
pub(crate) struct LossyOwnerRepository {
    inner: InMemoryPortalRepository,
    lose_owner_writes: AtomicBool,
}

impl LossyOwnerRepository {
    pub(crate) fn lose_owner_writes(&self, lose: bool) {
        self.lose_owner_writes.store(lose, Ordering::SeqCst);
    }
}

impl PortalRepository for LossyOwnerRepository {
    fn insert_municipality(
        &self,
        municipality: Municipality,
    ) -> Result<Municipality, RepositoryError> {
        self.inner.insert_municipality(municipality)
    }

    fn municipality(&self, id: &MunicipalityId) -> Result<Option<Municipality>, RepositoryError> {
        self.inner.municipality(id)
    }

    fn municipalities(&self) -> Result<Vec<Municipality>, RepositoryError> {
        self.inner.municipalities()
    }

    fn admit_project<E, F>(&self, municipality_id: &MunicipalityId, admit: F) -> Result<Project, E>
    where
        F: FnOnce(&mut Municipality, &[Project]) -> Result<Project, E>,
        E: From<RepositoryError>,
    {
        self.inner.admit_project(municipality_id, admit)
    }

    fn update_municipality<F>(
        &self,
        id: &MunicipalityId,
        update: F,
    ) -> Result<Municipality, RepositoryError>
    where
        F: FnOnce(&mut Municipality),
    {
        self.inner.update_municipality(id, update)
    }

    fn project(&self, id: &ProjectId) -> Result<Option<Project>, RepositoryError> {
        self.inner.project(id)
    }

    fn projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>, RepositoryError> {
        self.inner.projects(filter)
    }

    fn update_project<T, E, F>(&self, id: &ProjectId, apply: F) -> Result<(Project, T), E>
    where
        F: FnOnce(&mut Project) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        self.inner.update_project(id, apply)
    }

    fn update_project_with_owner<T, E, F>(
        &self,
        id: &ProjectId,
        apply: F,
    ) -> Result<(Project, Municipality, T), E>
    where
        F: FnOnce(&mut Project, &mut Municipality) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        if !self.lose_owner_writes.load(Ordering::SeqCst) {
            return self.inner.update_project_with_owner(id, apply);
        }
        self.inner
            .update_project_with_owner(id, |project, municipality| {
                apply(project, municipality)?;
                Err(E::from(RepositoryError::Unavailable(
                    "commit lost".to_string(),
                )))
            })
    }

    fn queue_pins(&self) -> Result<Vec<ProjectId>, RepositoryError> {
        self.inner.queue_pins()
    }

    fn set_queue_pins(&self, pins: Vec<ProjectId>) -> Result<(), RepositoryError> {
        self.inner.set_queue_pins(pins)
    }

    fn insert_technician(&self, technician: Technician) -> Result<Technician, RepositoryError> {
        self.inner.insert_technician(technician)
    }

    fn technician(&self, id: &TechnicianId) -> Result<Option<Technician>, RepositoryError> {
        self.inner.technician(id)
    }

    fn technicians(&self) -> Result<Vec<Technician>, RepositoryError> {
        self.inner.technicians()
    }
}

pub(crate) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
