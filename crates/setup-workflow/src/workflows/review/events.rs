use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::domain::{ActorId, ApplicationId, Operation, RecordId, ReviewState};
use super::repository::{ApplicationStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Notification emitted once per committed transition. Submission has no `from_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub event_id: EventId,
    pub record_id: RecordId,
    pub application_id: ApplicationId,
    pub operation: Operation,
    pub from_state: Option<ReviewState>,
    pub to_state: ReviewState,
    pub actor: ActorId,
    pub version: u64,
    pub timestamp: DateTime<Utc>,
}

/// Outbound notification hook (e-mail, UI refresh, dashboards).
///
/// Implementations must not block the caller; hand the event to a queue and return.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &TransitionEvent) -> Result<(), PublishError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("event transport unavailable: {0}")]
    Transport(String),
    #[error("event subscriber has shut down")]
    Closed,
}

/// Outcome of one redelivery sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Re-publish events whose delivery was never confirmed. Meant for a periodic sweeper; the
/// commit path already attempts delivery once.
pub fn relay_undelivered_events<S, P>(
    store: &S,
    publisher: &P,
    limit: usize,
) -> Result<RelayReport, StoreError>
where
    S: ApplicationStore + ?Sized,
    P: EventPublisher + ?Sized,
{
    let mut report = RelayReport::default();
    for event in store.undelivered_events(limit)? {
        match publisher.publish(&event) {
            Ok(()) => {
                store.mark_delivered(&event.event_id)?;
                report.delivered += 1;
            }
            Err(err) => {
                warn!(event_id = %event.event_id, application = %event.application_id, error = %err, "event redelivery failed");
                report.failed += 1;
            }
        }
    }
    if report.delivered > 0 || report.failed > 0 {
        debug!(
            delivered = report.delivered,
            failed = report.failed,
            "outbox sweep finished"
        );
    }
    Ok(report)
}
