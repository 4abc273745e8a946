use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::admission::{AdmissionController, AdmissionRejection};
use super::advisory::{
    AdvisoryGateway, AllocationBrief, AllocationSuggestion, ComplexityDiagnosis, ProjectAdvisor,
    ProjectBrief, TeamCandidate,
};
use super::domain::{
    stage_template, EngagementProfile, EngagementUpdate, Municipality, MunicipalityId,
    MunicipalityRegistration, PriorityWeight, Project, ProjectId, ProjectStatus,
    ProjectSubmission, ProjectUpdate, ScoringInputs, StageStatus, Technician, TechnicianId,
    TechnicianRegistration, ValidationError,
};
use super::queue::{compare_ranked, PrioritizationQueue, QueueEntry, QueueError, QUEUE_STATUSES};
use super::repository::{NotificationPublisher, PortalRepository, ProjectFilter, RepositoryError};
use super::stages::{
    refresh_derived, stage_notification, StageTransition, WorkflowError, WorkflowStateMachine,
};
use crate::config::AdvisoryConfig;

/// Service composing the admission gates, stage workflow, queue, and collaborators.
pub struct ProjectPortalService<R, N, D> {
    repository: Arc<R>,
    notifier: Arc<N>,
    advisory: AdvisoryGateway<D>,
    admission: AdmissionController,
    workflow: WorkflowStateMachine,
    queue: PrioritizationQueue,
    sequence: AtomicU64,
}

/// Result of a stage move: the committed project and what changed.
#[derive(Debug, Clone, Serialize)]
pub struct StageUpdate {
    pub project: Project,
    pub transition: StageTransition,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosisOutcome {
    pub diagnosis: ComplexityDiagnosis,
    pub project: Project,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignedProjectView {
    pub id: ProjectId,
    pub title: String,
    pub priority_weight: PriorityWeight,
    pub status: ProjectStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamMemberView {
    #[serde(flatten)]
    pub technician: Technician,
    pub active_projects: u32,
    pub capacity_percent: f64,
    pub assigned_projects: Vec<AssignedProjectView>,
}

impl<R, N, D> ProjectPortalService<R, N, D>
where
    R: PortalRepository + 'static,
    N: NotificationPublisher + 'static,
    D: ProjectAdvisor + 'static,
{
    pub fn new(repository: Arc<R>, notifier: Arc<N>, advisor: Arc<D>, config: AdvisoryConfig) -> Self {
        Self {
            repository,
            notifier,
            advisory: AdvisoryGateway::new(advisor, config.timeout),
            admission: AdmissionController::new(),
            workflow: WorkflowStateMachine::new(),
            queue: PrioritizationQueue::new(),
            sequence: AtomicU64::new(1),
        }
    }

    pub fn notifier(&self) -> &Arc<N> {
        &self.notifier
    }

    fn next_id(&self, prefix: &str) -> String {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}-{id:06}")
    }

    pub fn register_municipality(
        &self,
        registration: MunicipalityRegistration,
    ) -> Result<Municipality, PortalServiceError> {
        registration.validate()?;
        let municipality = Municipality {
            id: MunicipalityId(self.next_id("mun")),
            name: registration.name.trim().to_string(),
            code: registration.code.trim().to_ascii_uppercase(),
            contact_email: registration.contact_email.trim().to_string(),
            contact_phone: registration.contact_phone,
            engagement: EngagementProfile::default(),
            active_stars: Default::default(),
            total_projects: 0,
            completed_projects: 0,
            created_at: Utc::now(),
        };
        let stored = self.repository.insert_municipality(municipality)?;
        info!(municipality_id = %stored.id, name = %stored.name, "municipality registered");
        Ok(stored)
    }

    pub fn municipality(&self, id: &MunicipalityId) -> Result<Municipality, PortalServiceError> {
        self.repository
            .municipality(id)?
            .ok_or_else(|| PortalServiceError::MunicipalityNotFound(id.clone()))
    }

    pub fn municipalities(&self) -> Result<Vec<Municipality>, PortalServiceError> {
        Ok(self.repository.municipalities()?)
    }

    pub fn update_engagement(
        &self,
        id: &MunicipalityId,
        update: EngagementUpdate,
    ) -> Result<Municipality, PortalServiceError> {
        update.validate()?;
        let municipality = self
            .repository
            .update_municipality(id, |municipality| update.apply_to(&mut municipality.engagement))
            .map_err(|err| {
                PortalServiceError::from(err)
                    .or_missing(|| PortalServiceError::MunicipalityNotFound(id.clone()))
            })?;

        info!(
            municipality_id = %municipality.id,
            engagement_score = municipality.engagement.engagement_score,
            meeting_participations = municipality.engagement.meeting_participations,
            financial_regularity = municipality.engagement.financial_regularity,
            "municipality engagement updated"
        );
        Ok(municipality)
    }

    /// Validate and admit a submission; the star reservation and the project are one write.
    pub fn submit(&self, submission: ProjectSubmission) -> Result<Project, PortalServiceError> {
        submission.validate()?;

        let project_id = ProjectId(self.next_id("prj"));
        let now = Utc::now();
        let admission = self.admission;

        let outcome = self
            .repository
            .admit_project(&submission.municipality_id, |municipality, existing| {
                admission.admit(
                    municipality,
                    existing,
                    submission.category,
                    submission.priority_weight,
                )?;
                Ok::<_, PortalServiceError>(admitted_project(
                    project_id,
                    &submission,
                    &municipality.name,
                    now,
                ))
            })
            .map_err(|err| {
                err.or_missing(|| {
                    PortalServiceError::MunicipalityNotFound(submission.municipality_id.clone())
                })
            });

        match &outcome {
            Ok(project) => info!(
                project_id = %project.id,
                municipality_id = %project.municipality_id,
                category = %project.category,
                priority_weight = %project.priority_weight,
                ipr_score = project.ipr_score,
                "project admitted"
            ),
            Err(PortalServiceError::Admission(rejection)) => warn!(
                municipality_id = %submission.municipality_id,
                %rejection,
                "project submission rejected"
            ),
            Err(_) => {}
        }
        outcome
    }

    pub fn project(&self, id: &ProjectId) -> Result<Project, PortalServiceError> {
        self.repository
            .project(id)?
            .ok_or_else(|| PortalServiceError::ProjectNotFound(id.clone()))
    }

    /// Filtered listing ranked the same way as the technical queue.
    pub fn projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>, PortalServiceError> {
        let mut projects = self.repository.projects(filter)?;
        projects.sort_by(compare_ranked);
        Ok(projects)
    }

    /// Apply descriptive and scoring edits; any scoring input change re-scores the project.
    pub fn update_project(
        &self,
        id: &ProjectId,
        update: ProjectUpdate,
    ) -> Result<Project, PortalServiceError> {
        update.validate()?;
        let now = Utc::now();

        let (project, rescored) = self
            .repository
            .update_project(id, |project| {
                apply_update(project, update, now);
                Ok::<_, PortalServiceError>(project.ipr_score)
            })
            .map_err(|err| err.or_missing(|| PortalServiceError::ProjectNotFound(id.clone())))?;

        info!(project_id = %project.id, ipr_score = rescored, "project updated");
        Ok(project)
    }

    /// Move one stage forward and publish the resulting notification. The move that concludes
    /// a project releases its stars in the same write.
    pub fn transition_stage(
        &self,
        id: &ProjectId,
        stage_index: i64,
        status: StageStatus,
    ) -> Result<StageUpdate, PortalServiceError> {
        let now = Utc::now();
        let workflow = self.workflow;
        let admission = self.admission;

        let (project, owner, transition) = self
            .repository
            .update_project_with_owner(id, |project, municipality| {
                let transition = workflow.transition(project, stage_index, status, now)?;
                if transition.concluded_now {
                    admission.release(municipality, project.category, project.priority_weight);
                }
                Ok::<_, PortalServiceError>(transition)
            })
            .map_err(|err| err.or_missing(|| PortalServiceError::ProjectNotFound(id.clone())))?;

        info!(
            project_id = %project.id,
            stage = transition.stage.label(),
            status = %transition.status,
            progress = transition.progress_percent,
            project_status = %transition.project_status,
            "stage updated"
        );

        if transition.concluded_now {
            info!(
                project_id = %project.id,
                municipality_id = %owner.id,
                category = %project.category,
                remaining = owner.stars_in(project.category),
                "project concluded; star budget released"
            );
        }

        if let Err(err) = self
            .notifier
            .publish(stage_notification(&project, &transition))
        {
            warn!(project_id = %project.id, error = %err, "stage notification not delivered");
        }

        Ok(StageUpdate {
            project,
            transition,
        })
    }

    pub fn technical_queue(&self) -> Result<Vec<QueueEntry>, PortalServiceError> {
        let queued = self
            .repository
            .projects(&ProjectFilter::with_statuses(&QUEUE_STATUSES))?;
        let pins = self.repository.queue_pins()?;
        Ok(self.queue.rank(queued, &pins))
    }

    /// Pin the given projects to the head of the queue in order; an empty list clears pins.
    pub fn reorder_queue(
        &self,
        project_ids: Vec<ProjectId>,
    ) -> Result<Vec<QueueEntry>, PortalServiceError> {
        let queued = self
            .repository
            .projects(&ProjectFilter::with_statuses(&QUEUE_STATUSES))?;
        let pins = self.queue.validate_override(&queued, &project_ids)?;
        self.repository.set_queue_pins(pins.clone())?;
        info!(pinned = pins.len(), "technical queue override updated");
        Ok(self.queue.rank(queued, &pins))
    }

    pub fn register_technician(
        &self,
        registration: TechnicianRegistration,
    ) -> Result<Technician, PortalServiceError> {
        registration.validate()?;
        let mut specialties = registration.specialties;
        specialties.sort();
        specialties.dedup();
        let technician = Technician {
            id: TechnicianId(self.next_id("tec")),
            name: registration.name.trim().to_string(),
            email: registration.email.trim().to_string(),
            specialties,
            workload_hours: registration.workload_hours,
            created_at: Utc::now(),
        };
        Ok(self.repository.insert_technician(technician)?)
    }

    pub fn team_roster(&self) -> Result<Vec<TeamMemberView>, PortalServiceError> {
        let technicians = self.repository.technicians()?;
        let open = self.repository.projects(&ProjectFilter::default())?;

        Ok(technicians
            .into_iter()
            .map(|technician| {
                let assigned: Vec<AssignedProjectView> = open
                    .iter()
                    .filter(|project| project.status != ProjectStatus::Concluido)
                    .filter(|project| project.assigned_team.contains(&technician.id))
                    .map(|project| AssignedProjectView {
                        id: project.id.clone(),
                        title: project.title.clone(),
                        priority_weight: project.priority_weight,
                        status: project.status,
                    })
                    .collect();
                let active = u32::try_from(assigned.len()).unwrap_or(u32::MAX);
                TeamMemberView {
                    capacity_percent: capacity_percent(active, technician.workload_hours),
                    active_projects: active,
                    assigned_projects: assigned,
                    technician,
                }
            })
            .collect())
    }

    pub fn allocate_team(
        &self,
        id: &ProjectId,
        technician_ids: Vec<TechnicianId>,
    ) -> Result<Project, PortalServiceError> {
        let mut team = Vec::with_capacity(technician_ids.len());
        for technician_id in technician_ids {
            if self.repository.technician(&technician_id)?.is_none() {
                return Err(PortalServiceError::TechnicianNotFound(technician_id));
            }
            if !team.contains(&technician_id) {
                team.push(technician_id);
            }
        }

        let now = Utc::now();
        let (project, ()) = self
            .repository
            .update_project(id, |project| {
                project.assigned_team = team;
                project.updated_at = now;
                Ok::<_, PortalServiceError>(())
            })
            .map_err(|err| err.or_missing(|| PortalServiceError::ProjectNotFound(id.clone())))?;

        info!(project_id = %project.id, team = project.assigned_team.len(), "team allocated");
        Ok(project)
    }

    /// Ask the advisor for a complexity class. The call never fails on advisory errors: the
    /// fallback classification is stored instead and the project is re-scored either way.
    pub async fn diagnose_complexity(
        &self,
        id: &ProjectId,
    ) -> Result<DiagnosisOutcome, PortalServiceError> {
        let brief = ProjectBrief::from(&self.project(id)?);
        let diagnosis = self.advisory.diagnose(brief).await;

        let now = Utc::now();
        let (project, ()) = self
            .repository
            .update_project(id, |project| {
                project.scoring.complexity = Some(diagnosis.complexity);
                project.advisory_diagnosis = Some(diagnosis.justification.clone());
                project.ipr_score = project.scoring.score();
                project.updated_at = now;
                Ok::<_, PortalServiceError>(())
            })
            .map_err(|err| err.or_missing(|| PortalServiceError::ProjectNotFound(id.clone())))?;

        info!(
            project_id = %project.id,
            complexity = diagnosis.complexity.as_str(),
            low_confidence = diagnosis.low_confidence,
            ipr_score = project.ipr_score,
            "complexity diagnosed"
        );
        Ok(DiagnosisOutcome { diagnosis, project })
    }

    pub async fn suggest_allocation(
        &self,
        id: &ProjectId,
    ) -> Result<AllocationSuggestion, PortalServiceError> {
        let project = self.project(id)?;
        let roster = self
            .team_roster()?
            .into_iter()
            .map(|member| TeamCandidate {
                id: member.technician.id,
                name: member.technician.name,
                specialties: member.technician.specialties,
                active_projects: member.active_projects,
                workload_hours: member.technician.workload_hours,
            })
            .collect();

        Ok(self
            .advisory
            .suggest(AllocationBrief {
                project: ProjectBrief::from(&project),
                roster,
            })
            .await)
    }
}

fn admitted_project(
    id: ProjectId,
    submission: &ProjectSubmission,
    municipality_name: &str,
    now: DateTime<Utc>,
) -> Project {
    let scoring = ScoringInputs {
        impact: submission.impact,
        urgency: submission.urgency,
        cost: submission.cost,
        complexity: None,
    };
    let mut project = Project {
        id,
        title: submission.title.trim().to_string(),
        description: submission.description.trim().to_string(),
        category: submission.category,
        municipality_id: submission.municipality_id.clone(),
        municipality_name: municipality_name.to_string(),
        priority_weight: submission.priority_weight,
        ipr_score: scoring.score(),
        scoring,
        status: ProjectStatus::Solicitacao,
        progress_percent: 0.0,
        stages: stage_template(),
        assigned_team: Vec::new(),
        location: submission.location.clone(),
        scope: submission.scope.clone(),
        purpose: submission.purpose.clone(),
        estimated_deadline: None,
        advisory_diagnosis: None,
        created_at: now,
        updated_at: now,
    };
    refresh_derived(&mut project);
    project
}

fn apply_update(project: &mut Project, update: ProjectUpdate, now: DateTime<Utc>) {
    let rescore = update.touches_scoring();
    let ProjectUpdate {
        title,
        description,
        location,
        scope,
        purpose,
        estimated_deadline,
        complexity,
        impact,
        urgency,
        cost,
    } = update;

    if let Some(title) = title {
        project.title = title.trim().to_string();
    }
    if let Some(description) = description {
        project.description = description.trim().to_string();
    }
    if location.is_some() {
        project.location = location;
    }
    if scope.is_some() {
        project.scope = scope;
    }
    if purpose.is_some() {
        project.purpose = purpose;
    }
    if estimated_deadline.is_some() {
        project.estimated_deadline = estimated_deadline;
    }
    if complexity.is_some() {
        project.scoring.complexity = complexity;
    }
    if let Some(impact) = impact {
        project.scoring.impact = impact;
    }
    if let Some(urgency) = urgency {
        project.scoring.urgency = urgency;
    }
    if let Some(cost) = cost {
        project.scoring.cost = cost;
    }
    if rescore {
        project.ipr_score = project.scoring.score();
    }
    project.updated_at = now;
}

/// Share of a technician's weekly slots in use, one slot per eight hours.
pub fn capacity_percent(active_projects: u32, workload_hours: u16) -> f64 {
    let slots = (f64::from(workload_hours) / 8.0).max(1.0);
    (f64::from(active_projects) / slots * 100.0).min(100.0)
}

/// Error raised by the portal service.
#[derive(Debug, thiserror::Error)]
pub enum PortalServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Admission(#[from] AdmissionRejection),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("municipality {0} not found")]
    MunicipalityNotFound(MunicipalityId),
    #[error("project {0} not found")]
    ProjectNotFound(ProjectId),
    #[error("technician {0} not found")]
    TechnicianNotFound(TechnicianId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl PortalServiceError {
    fn or_missing(self, missing: impl FnOnce() -> Self) -> Self {
        match self {
            Self::Repository(RepositoryError::NotFound) => missing(),
            other => other,
        }
    }
}

