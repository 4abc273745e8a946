use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::domain::{
    Complexity, PriorityWeight, Project, ProjectCategory, ProjectId, TechnicianId,
};

/// Descriptive fields handed to the advisory collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectBrief {
    pub project_id: ProjectId,
    pub title: String,
    pub description: String,
    pub category: ProjectCategory,
    pub priority_weight: PriorityWeight,
    pub complexity: Option<Complexity>,
    pub location: Option<String>,
    pub scope: Option<String>,
    pub purpose: Option<String>,
    pub impact: u8,
    pub urgency: u8,
    pub cost: u8,
}

impl From<&Project> for ProjectBrief {
    fn from(project: &Project) -> Self {
        Self {
            project_id: project.id.clone(),
            title: project.title.clone(),
            description: project.description.clone(),
            category: project.category,
            priority_weight: project.priority_weight,
            complexity: project.scoring.complexity,
            location: project.location.clone(),
            scope: project.scope.clone(),
            purpose: project.purpose.clone(),
            impact: project.scoring.impact,
            urgency: project.scoring.urgency,
            cost: project.scoring.cost,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamCandidate {
    pub id: TechnicianId,
    pub name: String,
    pub specialties: Vec<ProjectCategory>,
    pub active_projects: u32,
    pub workload_hours: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationBrief {
    pub project: ProjectBrief,
    pub roster: Vec<TeamCandidate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityDiagnosis {
    pub complexity: Complexity,
    pub justification: String,
    pub confidence: f32,
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Set when the value is a fallback rather than an advisory answer.
    #[serde(default)]
    pub low_confidence: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationSuggestion {
    pub suggested_team: Vec<TechnicianId>,
    pub reasoning: String,
    #[serde(default)]
    pub workload_impact: Option<String>,
    #[serde(default)]
    pub low_confidence: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdvisoryError {
    #[error("advisory service unavailable: {0}")]
    Unavailable(String),
    #[error("advisory call exceeded {0:?}")]
    Timeout(Duration),
    #[error("advisory response could not be interpreted: {0}")]
    Malformed(String),
}

/// External advisor for complexity classification and team suggestions. Answers are hints.
pub trait ProjectAdvisor: Send + Sync {
    fn diagnose_complexity(
        &self,
        brief: ProjectBrief,
    ) -> impl Future<Output = Result<ComplexityDiagnosis, AdvisoryError>> + Send;

    fn suggest_allocation(
        &self,
        brief: AllocationBrief,
    ) -> impl Future<Output = Result<AllocationSuggestion, AdvisoryError>> + Send;
}

pub const FALLBACK_CONFIDENCE: f32 = 0.5;

pub fn fallback_diagnosis() -> ComplexityDiagnosis {
    ComplexityDiagnosis {
        complexity: Complexity::Media,
        justification: "Advisory unavailable - default classification".to_string(),
        confidence: FALLBACK_CONFIDENCE,
        recommendations: Vec::new(),
        low_confidence: true,
    }
}

pub fn fallback_suggestion() -> AllocationSuggestion {
    AllocationSuggestion {
        suggested_team: Vec::new(),
        reasoning: "Advisory unavailable - allocate manually".to_string(),
        workload_impact: None,
        low_confidence: true,
    }
}

/// Wraps an advisor with a deadline and degrades every failure to a fixed default.
pub struct AdvisoryGateway<D> {
    advisor: Arc<D>,
    timeout: Duration,
}

impl<D> AdvisoryGateway<D>
where
    D: ProjectAdvisor,
{
    pub fn new(advisor: Arc<D>, timeout: Duration) -> Self {
        Self { advisor, timeout }
    }

    pub async fn diagnose(&self, brief: ProjectBrief) -> ComplexityDiagnosis {
        let project_id = brief.project_id.clone();
        let call = self.advisor.diagnose_complexity(brief);
        match self.bounded(call).await {
            Ok(mut diagnosis) => {
                diagnosis.confidence = sanitize_confidence(diagnosis.confidence);
                diagnosis
            }
            Err(err) => {
                warn!(%project_id, error = %err, "complexity diagnosis fell back to media");
                fallback_diagnosis()
            }
        }
    }

    pub async fn suggest(&self, brief: AllocationBrief) -> AllocationSuggestion {
        let project_id = brief.project.project_id.clone();
        let roster: HashSet<TechnicianId> =
            brief.roster.iter().map(|member| member.id.clone()).collect();
        let call = self.advisor.suggest_allocation(brief);
        match self.bounded(call).await {
            Ok(mut suggestion) => {
                let before = suggestion.suggested_team.len();
                let mut seen = HashSet::new();
                suggestion
                    .suggested_team
                    .retain(|id| roster.contains(id) && seen.insert(id.clone()));
                if suggestion.suggested_team.len() != before {
                    warn!(%project_id, "dropped unknown or repeated technicians from suggestion");
                }
                suggestion
            }
            Err(err) => {
                warn!(%project_id, error = %err, "allocation suggestion fell back to manual");
                fallback_suggestion()
            }
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, AdvisoryError>>,
    ) -> Result<T, AdvisoryError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AdvisoryError::Timeout(self.timeout)),
        }
    }
}

fn sanitize_confidence(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        FALLBACK_CONFIDENCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::projects::domain::ProjectCategory;
    use crate::workflows::projects::tests::common::{project_for, ScriptedAdvisor};

    fn brief() -> ProjectBrief {
        ProjectBrief::from(&project_for("mun-1", ProjectCategory::Infraestrutura, 3))
    }

    #[tokio::test]
    async fn passes_through_answers_within_deadline() {
        let gateway = AdvisoryGateway::new(
            Arc::new(ScriptedAdvisor::answering(Complexity::Alta, 1.7)),
            Duration::from_secs(1),
        );
        let diagnosis = gateway.diagnose(brief()).await;
        assert_eq!(diagnosis.complexity, Complexity::Alta);
        assert_eq!(diagnosis.confidence, 1.0);
        assert!(!diagnosis.low_confidence);
    }

    #[tokio::test]
    async fn failures_degrade_to_media() {
        let gateway = AdvisoryGateway::new(
            Arc::new(ScriptedAdvisor::failing()),
            Duration::from_secs(1),
        );
        let diagnosis = gateway.diagnose(brief()).await;
        assert_eq!(diagnosis, fallback_diagnosis());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_advisor_times_out_to_default() {
        let gateway = AdvisoryGateway::new(
            Arc::new(ScriptedAdvisor::stalled()),
            Duration::from_millis(50),
        );
        let diagnosis = gateway.diagnose(brief()).await;
        assert_eq!(diagnosis.complexity, Complexity::Media);
        assert!(diagnosis.low_confidence);

        let suggestion = gateway
            .suggest(AllocationBrief {
                project: brief(),
                roster: Vec::new(),
            })
            .await;
        assert!(suggestion.suggested_team.is_empty());
        assert!(suggestion.low_confidence);
    }
}
