use crate::cli::ServeArgs;
use crate::demo::seed_portal;
use crate::infra::{build_portal, AppState};
use crate::routes::with_portal_routes;
use amvali_portal::config::AppConfig;
use amvali_portal::error::AppError;
use amvali_portal::telemetry;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let portal = build_portal(config.advisory);
    if args.seed {
        let summary = seed_portal(&portal, args.municipalities_csv.as_deref())?;
        info!(
            municipalities = summary.municipalities,
            projects = summary.projects,
            technicians = summary.technicians,
            "demo data seeded"
        );
    }

    let app = with_portal_routes(portal)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        advisory_timeout_ms = config.advisory.timeout.as_millis() as u64,
        "project portal ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
