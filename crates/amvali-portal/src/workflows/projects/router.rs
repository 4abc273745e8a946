use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::advisory::ProjectAdvisor;
use super::domain::{
    EngagementUpdate, MunicipalityId, MunicipalityRegistration, NotificationId, ProjectId,
    ProjectStatus, ProjectSubmission, ProjectUpdate, StageStatus, TechnicianId,
    TechnicianRegistration,
};
use super::repository::{
    NotificationError, NotificationInbox, NotificationPublisher, PortalRepository, ProjectFilter,
    RepositoryError,
};
use super::service::{PortalServiceError, ProjectPortalService};

type SharedService<R, N, D> = Arc<ProjectPortalService<R, N, D>>;

/// Router builder exposing the municipal portal endpoints.
pub fn portal_router<R, N, D>(service: SharedService<R, N, D>) -> Router
where
    R: PortalRepository + 'static,
    N: NotificationPublisher + 'static,
    D: ProjectAdvisor + 'static,
{
    Router::new()
        .route(
            "/api/v1/municipalities",
            post(register_municipality_handler::<R, N, D>).get(list_municipalities_handler::<R, N, D>),
        )
        .route(
            "/api/v1/municipalities/:municipality_id",
            get(municipality_handler::<R, N, D>),
        )
        .route(
            "/api/v1/municipalities/:municipality_id/engagement",
            put(engagement_handler::<R, N, D>),
        )
        .route(
            "/api/v1/projects",
            post(submit_handler::<R, N, D>).get(list_projects_handler::<R, N, D>),
        )
        .route(
            "/api/v1/projects/:project_id",
            get(project_handler::<R, N, D>).put(update_project_handler::<R, N, D>),
        )
        .route(
            "/api/v1/projects/:project_id/stages/:stage_index",
            put(stage_handler::<R, N, D>),
        )
        .route(
            "/api/v1/projects/:project_id/diagnosis",
            post(diagnosis_handler::<R, N, D>),
        )
        .route(
            "/api/v1/projects/:project_id/allocation-suggestion",
            post(allocation_suggestion_handler::<R, N, D>),
        )
        .route(
            "/api/v1/projects/:project_id/team",
            put(allocate_team_handler::<R, N, D>),
        )
        .route("/api/v1/queue", get(queue_handler::<R, N, D>))
        .route("/api/v1/queue/reorder", post(reorder_handler::<R, N, D>))
        .route(
            "/api/v1/team",
            post(register_technician_handler::<R, N, D>).get(team_handler::<R, N, D>),
        )
        .with_state(service)
}

/// Recipient-facing notification endpoints over any inbox store.
pub fn notification_router<I>(inbox: Arc<I>) -> Router
where
    I: NotificationInbox + 'static,
{
    Router::new()
        .route("/api/v1/notifications", get(notifications_handler::<I>))
        .route(
            "/api/v1/notifications/:notification_id/read",
            put(mark_read_handler::<I>),
        )
        .with_state(inbox)
}

#[derive(Debug, Deserialize)]
pub(crate) struct InboxQuery {
    pub recipient_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProjectListQuery {
    pub status: Option<ProjectStatus>,
    pub municipality_id: Option<String>,
}

impl From<ProjectListQuery> for ProjectFilter {
    fn from(query: ProjectListQuery) -> Self {
        Self {
            statuses: query.status.into_iter().collect(),
            municipality_id: query.municipality_id.map(MunicipalityId),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct StageTransitionRequest {
    pub status: StageStatus,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ReorderRequest {
    pub project_ids: Vec<ProjectId>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TeamAllocationRequest {
    pub technician_ids: Vec<TechnicianId>,
}

fn respond<T: serde::Serialize>(
    status: StatusCode,
    outcome: Result<T, PortalServiceError>,
) -> Response {
    match outcome {
        Ok(body) => (status, axum::Json(body)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn register_municipality_handler<R, N, D>(
    State(service): State<SharedService<R, N, D>>,
    axum::Json(registration): axum::Json<MunicipalityRegistration>,
) -> Response
where
    R: PortalRepository + 'static,
    N: NotificationPublisher + 'static,
    D: ProjectAdvisor + 'static,
{
    respond(StatusCode::CREATED, service.register_municipality(registration))
}

pub(crate) async fn list_municipalities_handler<R, N, D>(
    State(service): State<SharedService<R, N, D>>,
) -> Response
where
    R: PortalRepository + 'static,
    N: NotificationPublisher + 'static,
    D: ProjectAdvisor + 'static,
{
    respond(StatusCode::OK, service.municipalities())
}

pub(crate) async fn municipality_handler<R, N, D>(
    State(service): State<SharedService<R, N, D>>,
    Path(municipality_id): Path<String>,
) -> Response
where
    R: PortalRepository + 'static,
    N: NotificationPublisher + 'static,
    D: ProjectAdvisor + 'static,
{
    respond(
        StatusCode::OK,
        service.municipality(&MunicipalityId(municipality_id)),
    )
}

pub(crate) async fn engagement_handler<R, N, D>(
    State(service): State<SharedService<R, N, D>>,
    Path(municipality_id): Path<String>,
    axum::Json(update): axum::Json<EngagementUpdate>,
) -> Response
where
    R: PortalRepository + 'static,
    N: NotificationPublisher + 'static,
    D: ProjectAdvisor + 'static,
{
    respond(
        StatusCode::OK,
        service.update_engagement(&MunicipalityId(municipality_id), update),
    )
}

pub(crate) async fn submit_handler<R, N, D>(
    State(service): State<SharedService<R, N, D>>,
    axum::Json(submission): axum::Json<ProjectSubmission>,
) -> Response
where
    R: PortalRepository + 'static,
    N: NotificationPublisher + 'static,
    D: ProjectAdvisor + 'static,
{
    respond(StatusCode::CREATED, service.submit(submission))
}

pub(crate) async fn list_projects_handler<R, N, D>(
    State(service): State<SharedService<R, N, D>>,
    Query(query): Query<ProjectListQuery>,
) -> Response
where
    R: PortalRepository + 'static,
    N: NotificationPublisher + 'static,
    D: ProjectAdvisor + 'static,
{
    respond(StatusCode::OK, service.projects(&ProjectFilter::from(query)))
}

pub(crate) async fn project_handler<R, N, D>(
    State(service): State<SharedService<R, N, D>>,
    Path(project_id): Path<String>,
) -> Response
where
    R: PortalRepository + 'static,
    N: NotificationPublisher + 'static,
    D: ProjectAdvisor + 'static,
{
    respond(StatusCode::OK, service.project(&ProjectId(project_id)))
}

pub(crate) async fn update_project_handler<R, N, D>(
    State(service): State<SharedService<R, N, D>>,
    Path(project_id): Path<String>,
    axum::Json(update): axum::Json<ProjectUpdate>,
) -> Response
where
    R: PortalRepository + 'static,
    N: NotificationPublisher + 'static,
    D: ProjectAdvisor + 'static,
{
    respond(
        StatusCode::OK,
        service.update_project(&ProjectId(project_id), update),
    )
}

pub(crate) async fn stage_handler<R, N, D>(
    State(service): State<SharedService<R, N, D>>,
    Path((project_id, stage_index)): Path<(String, i64)>,
    axum::Json(request): axum::Json<StageTransitionRequest>,
) -> Response
where
    R: PortalRepository + 'static,
    N: NotificationPublisher + 'static,
    D: ProjectAdvisor + 'static,
{
    match service.transition_stage(&ProjectId(project_id), stage_index, request.status) {
        Ok(update) => {
            let payload = json!({
                "progress": update.project.progress_percent,
                "status": update.project.status,
                "stages": update.project.stages,
                "transition": update.transition,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn diagnosis_handler<R, N, D>(
    State(service): State<SharedService<R, N, D>>,
    Path(project_id): Path<String>,
) -> Response
where
    R: PortalRepository + 'static,
    N: NotificationPublisher + 'static,
    D: ProjectAdvisor + 'static,
{
    respond(
        StatusCode::OK,
        service.diagnose_complexity(&ProjectId(project_id)).await,
    )
}

pub(crate) async fn allocation_suggestion_handler<R, N, D>(
    State(service): State<SharedService<R, N, D>>,
    Path(project_id): Path<String>,
) -> Response
where
    R: PortalRepository + 'static,
    N: NotificationPublisher + 'static,
    D: ProjectAdvisor + 'static,
{
    respond(
        StatusCode::OK,
        service.suggest_allocation(&ProjectId(project_id)).await,
    )
}

pub(crate) async fn allocate_team_handler<R, N, D>(
    State(service): State<SharedService<R, N, D>>,
    Path(project_id): Path<String>,
    axum::Json(request): axum::Json<TeamAllocationRequest>,
) -> Response
where
    R: PortalRepository + 'static,
    N: NotificationPublisher + 'static,
    D: ProjectAdvisor + 'static,
{
    respond(
        StatusCode::OK,
        service.allocate_team(&ProjectId(project_id), request.technician_ids),
    )
}

pub(crate) async fn queue_handler<R, N, D>(
    State(service): State<SharedService<R, N, D>>,
) -> Response
where
    R: PortalRepository + 'static,
    N: NotificationPublisher + 'static,
    D: ProjectAdvisor + 'static,
{
    match service.technical_queue() {
        Ok(queue) => queue_response(queue),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn reorder_handler<R, N, D>(
    State(service): State<SharedService<R, N, D>>,
    axum::Json(request): axum::Json<ReorderRequest>,
) -> Response
where
    R: PortalRepository + 'static,
    N: NotificationPublisher + 'static,
    D: ProjectAdvisor + 'static,
{
    match service.reorder_queue(request.project_ids) {
        Ok(queue) => queue_response(queue),
        Err(err) => err.into_response(),
    }
}

fn queue_response(queue: Vec<super::queue::QueueEntry>) -> Response {
    let total = queue.len();
    let payload = json!({
        "queue": queue,
        "total": total,
    });
    (StatusCode::OK, axum::Json(payload)).into_response()
}

pub(crate) async fn register_technician_handler<R, N, D>(
    State(service): State<SharedService<R, N, D>>,
    axum::Json(registration): axum::Json<TechnicianRegistration>,
) -> Response
where
    R: PortalRepository + 'static,
    N: NotificationPublisher + 'static,
    D: ProjectAdvisor + 'static,
{
    respond(StatusCode::CREATED, service.register_technician(registration))
}

pub(crate) async fn team_handler<R, N, D>(
    State(service): State<SharedService<R, N, D>>,
) -> Response
where
    R: PortalRepository + 'static,
    N: NotificationPublisher + 'static,
    D: ProjectAdvisor + 'static,
{
    respond(StatusCode::OK, service.team_roster())
}

pub(crate) async fn notifications_handler<I>(
    State(inbox): State<Arc<I>>,
    Query(query): Query<InboxQuery>,
) -> Response
where
    I: NotificationInbox + 'static,
{
    match inbox.notifications_for(&query.recipient_id) {
        Ok(entries) => (StatusCode::OK, axum::Json(entries)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn mark_read_handler<I>(
    State(inbox): State<Arc<I>>,
    Path(notification_id): Path<String>,
) -> Response
where
    I: NotificationInbox + 'static,
{
    match inbox.mark_read(&NotificationId(notification_id)) {
        Ok(entry) => (StatusCode::OK, axum::Json(entry)).into_response(),
        Err(err) => err.into_response(),
    }
}

impl IntoResponse for NotificationError {
    fn into_response(self) -> Response {
        let status = match self {
            NotificationError::NotFound(_) => StatusCode::NOT_FOUND,
            NotificationError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, axum::Json(json!({ "error": self.to_string() }))).into_response()
    }
}

fn tagged_payload(detail: impl serde::Serialize, message: String) -> Value {
    let mut payload = serde_json::to_value(detail).unwrap_or_else(|_| json!({}));
    if let Value::Object(fields) = &mut payload {
        fields.insert("error".to_string(), Value::String(message));
    }
    payload
}

impl IntoResponse for PortalServiceError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, payload) = match self {
            PortalServiceError::Admission(rejection) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                tagged_payload(rejection, message),
            ),
            PortalServiceError::Workflow(error) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                tagged_payload(error, message),
            ),
            PortalServiceError::Validation(_) | PortalServiceError::Queue(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": message }),
            ),
            PortalServiceError::MunicipalityNotFound(_)
            | PortalServiceError::ProjectNotFound(_)
            | PortalServiceError::TechnicianNotFound(_)
            | PortalServiceError::Repository(RepositoryError::NotFound) => {
                (StatusCode::NOT_FOUND, json!({ "error": message }))
            }
            PortalServiceError::Repository(RepositoryError::Conflict) => {
                (StatusCode::CONFLICT, json!({ "error": message }))
            }
            PortalServiceError::Repository(RepositoryError::Unavailable(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": message }),
            ),
        };
        (status, axum::Json(payload)).into_response()
    }
}
