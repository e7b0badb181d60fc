use crate::cli::ServeArgs;
use crate::infra::{
    spawn_notification_listener, spawn_outbox_sweeper, AppState, ChannelEventPublisher,
};
use crate::routes::with_review_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use setup_workflow::config::AppConfig;
use setup_workflow::error::AppError;
use setup_workflow::telemetry;
use setup_workflow::workflows::review::{
    InMemoryApplicationStore, ReviewWorkflowService, RoleDirectory,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

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

    let workflow = &config.workflow;
    if workflow.role_grants.is_empty() {
        warn!("SETUP_ROLE_GRANTS is empty; every workflow call will be refused");
    }
    let directory = RoleDirectory::from_grants(&workflow.role_grants);
    let (publisher, notifications) = ChannelEventPublisher::channel();
    spawn_notification_listener(notifications);

    let review_service = Arc::new(
        ReviewWorkflowService::new(
            Arc::new(InMemoryApplicationStore::new()),
            Arc::new(directory),
            Arc::new(publisher),
        )
        .with_reforward_policy(workflow.reforward_policy),
    );
    spawn_outbox_sweeper(
        review_service.clone(),
        workflow.outbox_sweep_interval,
        workflow.outbox_batch_size,
    );

    let app = with_review_routes(review_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        reforward_policy = workflow.reforward_policy.label(),
        "setup review workflow service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
