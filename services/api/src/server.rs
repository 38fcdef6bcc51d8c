use crate::cli::ServeArgs;
use crate::infra::{
    default_pipeline_config, AppState, InMemoryCache, InMemoryEventLog, InMemoryLeaderboardStore,
    InMemorySnapshotStore, InMemorySummaryStore, LoggingAchievementService, LoggingFeatureGate,
    LoggingModerationEscalator, LoggingMonitor, LoggingNotificationPublisher,
};
use crate::routes::with_reputation_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use reputation::config::AppConfig;
use reputation::error::AppError;
use reputation::pipeline::{Collaborators, EventProcessor, EveryNth, SystemClock};
use reputation::telemetry;
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

    let pipeline_config = default_pipeline_config();
    let sampling = Arc::new(EveryNth::new(pipeline_config.sampling_interval));
    let processor = Arc::new(EventProcessor::new(
        Arc::new(InMemoryEventLog::default()),
        Arc::new(InMemorySummaryStore::default()),
        Arc::new(InMemoryLeaderboardStore::default()),
        Arc::new(InMemorySnapshotStore::default()),
        Arc::new(InMemoryCache::default()),
        Collaborators {
            notifications: Arc::new(LoggingNotificationPublisher),
            moderation: Arc::new(LoggingModerationEscalator),
            achievements: Arc::new(LoggingAchievementService),
            gates: Arc::new(LoggingFeatureGate),
            monitor: Arc::new(LoggingMonitor),
        },
        sampling,
        Arc::new(SystemClock),
        pipeline_config,
    ));

    let app = with_reputation_routes(processor)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "reputation pipeline service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
