use metrics_exporter_prometheus::PrometheusHandle;
use setup_workflow::workflows::review::{
    ApplicationStore, Authorizer, EventPublisher, InMemoryApplicationStore, PublishError,
    ReviewWorkflowService, RoleDirectory, TransitionEvent,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub(crate) type ApiService =
    ReviewWorkflowService<InMemoryApplicationStore, RoleDirectory, ChannelEventPublisher>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Hands transition events to a background task so commits never wait on notification
/// delivery.
#[derive(Clone)]
pub(crate) struct ChannelEventPublisher {
    sender: mpsc::UnboundedSender<TransitionEvent>,
}

impl ChannelEventPublisher {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<TransitionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventPublisher for ChannelEventPublisher {
    fn publish(&self, event: &TransitionEvent) -> Result<(), PublishError> {
        self.sender
            .send(event.clone())
            .map_err(|_| PublishError::Closed)
    }
}

/// Stand-in for the e-mail and dashboard fan-out: logs each notification.
pub(crate) fn spawn_notification_listener(
    mut receiver: mpsc::UnboundedReceiver<TransitionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            info!(
                event_id = %event.event_id,
                application = %event.application_id,
                operation = %event.operation,
                to = %event.to_state,
                actor = %event.actor,
                version = event.version,
                "review notification dispatched"
            );
        }
        debug!("notification channel closed");
    })
}

/// Periodically re-publish outbox events whose first delivery attempt failed.
pub(crate) fn spawn_outbox_sweeper<S, A, P>(
    service: Arc<ReviewWorkflowService<S, A, P>>,
    every: Duration,
    batch_size: usize,
) -> JoinHandle<()>
where
    S: ApplicationStore + 'static,
    A: Authorizer + 'static,
    P: EventPublisher + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match service.relay_undelivered(batch_size) {
                Ok(report) if report.delivered > 0 || report.failed > 0 => {
                    info!(
                        delivered = report.delivered,
                        failed = report.failed,
                        "outbox sweep relayed events"
                    );
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "outbox sweep failed"),
            }
        }
    })
}
