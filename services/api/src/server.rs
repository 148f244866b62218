use crate::cli::ServeArgs;
use crate::infra::{
    default_coordination_config, demo_directory, AppState, InMemoryCoordinationStore,
    InMemoryNotificationPublisher,
};
use crate::routes::with_coordination_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use flatmatch::config::AppConfig;
use flatmatch::error::AppError;
use flatmatch::telemetry;
use flatmatch::workflows::coordination::CoordinationService;
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

    let store = Arc::new(InMemoryCoordinationStore::default());
    let directory = Arc::new(demo_directory());
    let notifier = Arc::new(InMemoryNotificationPublisher::default());
    let coordination_service = Arc::new(CoordinationService::new(
        store,
        directory,
        notifier,
        default_coordination_config(),
    ));

    let app = with_coordination_routes(coordination_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "coordination service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
