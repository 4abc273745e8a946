use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{
    Notification, NotificationKind, Project, ProjectStatus, Stage, StageKind, StageStatus,
    STAGE_COUNT,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowError {
    #[error("invalid stage index {index}: projects have {stage_count} stages")]
    InvalidStageIndex { index: i64, stage_count: usize },
    #[error("stage '{stage}' cannot move back from {from} to {to}")]
    BackwardTransition {
        index: usize,
        stage: &'static str,
        from: StageStatus,
        to: StageStatus,
    },
}

/// Outcome of a stage move, reported back to callers and used to trigger side effects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageTransition {
    pub index: usize,
    pub stage: StageKind,
    pub previous: StageStatus,
    pub status: StageStatus,
    pub progress_percent: f64,
    pub project_status: ProjectStatus,
    /// True only for the move that first brought every stage to completion.
    pub concluded_now: bool,
}

/// Forward-only state machine over a project's fixed stage track.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkflowStateMachine;

impl WorkflowStateMachine {
    pub fn new() -> Self {
        Self
    }

    pub fn transition(
        &self,
        project: &mut Project,
        index: i64,
        status: StageStatus,
        now: DateTime<Utc>,
    ) -> Result<StageTransition, WorkflowError> {
        let position = usize::try_from(index)
            .ok()
            .filter(|position| *position < STAGE_COUNT)
            .ok_or(WorkflowError::InvalidStageIndex {
                index,
                stage_count: STAGE_COUNT,
            })?;

        let was_concluded = project.status == ProjectStatus::Concluido;
        let stage = &mut project.stages[position];
        let previous = stage.status;
        if status.rank() < previous.rank() {
            return Err(WorkflowError::BackwardTransition {
                index: position,
                stage: stage.kind.label(),
                from: previous,
                to: status,
            });
        }

        stage.status = status;
        match status {
            StageStatus::InProgress => {
                stage.started_at.get_or_insert(now);
            }
            StageStatus::Completed => {
                stage.started_at.get_or_insert(now);
                stage.completed_at = Some(now);
            }
            StageStatus::Pending => {}
        }
        let kind = stage.kind;

        refresh_derived(project);
        project.updated_at = now;

        Ok(StageTransition {
            index: position,
            stage: kind,
            previous,
            status,
            progress_percent: project.progress_percent,
            project_status: project.status,
            concluded_now: !was_concluded && project.status == ProjectStatus::Concluido,
        })
    }
}

/// Recompute progress and status from the stage track.
pub fn refresh_derived(project: &mut Project) {
    project.progress_percent = progress_percent(&project.stages);
    project.status = derive_status(&project.stages);
}

pub fn progress_percent(stages: &[Stage; STAGE_COUNT]) -> f64 {
    let completed = stages
        .iter()
        .filter(|stage| stage.status == StageStatus::Completed)
        .count();
    100.0 * completed as f64 / STAGE_COUNT as f64
}

/// `concluido` once every stage is complete; otherwise the furthest stage that left `pending`.
pub fn derive_status(stages: &[Stage; STAGE_COUNT]) -> ProjectStatus {
    if stages
        .iter()
        .all(|stage| stage.status == StageStatus::Completed)
    {
        return ProjectStatus::Concluido;
    }

    stages
        .iter()
        .rev()
        .find(|stage| stage.status != StageStatus::Pending)
        .map(|stage| stage.kind.project_status())
        .unwrap_or(ProjectStatus::Solicitacao)
}

/// Notification sent to the owning municipality after a stage move.
pub fn stage_notification(project: &Project, transition: &StageTransition) -> Notification {
    let stage = transition.stage.label();
    Notification {
        recipient_id: project.municipality_id.0.clone(),
        title: format!("Etapa atualizada: {stage}"),
        message: format!(
            "O projeto '{}' avançou para a etapa '{stage}' ({})",
            project.title,
            transition.status.label()
        ),
        kind: NotificationKind::Info,
        project_id: Some(project.id.clone()),
        created_at: project.updated_at,
    }
}
