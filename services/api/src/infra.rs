use amvali_portal::config::AdvisoryConfig;
use amvali_portal::workflows::projects::{
    AdvisoryError, AllocationBrief, AllocationSuggestion, ComplexityDiagnosis,
    InMemoryNotificationOutbox, InMemoryPortalRepository, ProjectAdvisor, ProjectBrief,
    ProjectPortalService,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type PortalService =
    ProjectPortalService<InMemoryPortalRepository, InMemoryNotificationOutbox, UnconfiguredAdvisor>;

pub(crate) fn build_portal(advisory: AdvisoryConfig) -> Arc<PortalService> {
    Arc::new(ProjectPortalService::new(
        Arc::new(InMemoryPortalRepository::default()),
        Arc::new(InMemoryNotificationOutbox::default()),
        Arc::new(UnconfiguredAdvisor),
        advisory,
    ))
}

/// Stand-in advisor for deployments without an advisory provider; every call degrades to the
/// gateway's fallback answer.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct UnconfiguredAdvisor;

impl ProjectAdvisor for UnconfiguredAdvisor {
    async fn diagnose_complexity(
        &self,
        _brief: ProjectBrief,
    ) -> Result<ComplexityDiagnosis, AdvisoryError> {
        Err(AdvisoryError::Unavailable(
            "no advisory provider configured".to_string(),
        ))
    }

    async fn suggest_allocation(
        &self,
        _brief: AllocationBrief,
    ) -> Result<AllocationSuggestion, AdvisoryError> {
        Err(AdvisoryError::Unavailable(
            "no advisory provider configured".to_string(),
        ))
    }
}
