use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::audit::{AuditDecision, AuditTrail, HistoryEntry};
use super::domain::{
    ActorId, ApplicationId, ApplicationSubmission, DocumentReference, DostDecision, PstoDecision,
    RecordId, ReviewState, Role,
};
use super::events::{EventId, TransitionEvent};
use super::guards;
use super::machine::{derive_state, RecordMutation};

/// Persistent representation of one application and its review progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: RecordId,
    pub application_id: ApplicationId,
    pub enterprise_name: String,
    pub proponent_id: ActorId,
    pub state: ReviewState,
    pub psto_decision: Option<PstoDecision>,
    pub dost_decision: Option<DostDecision>,
    pub tna_conducted: bool,
    pub tna_report_submitted: bool,
    pub assessment_report: Option<DocumentReference>,
    pub forwarded_to_dost: bool,
    pub forwarded_at: Option<DateTime<Utc>>,
    pub assigned_reviewer: Option<ActorId>,
    pub documents: Vec<DocumentReference>,
    pub history: AuditTrail,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationRecord {
    /// Build the version 1 record for a fresh submission.
    pub fn submitted(
        id: RecordId,
        application_id: ApplicationId,
        proponent_id: ActorId,
        submission: ApplicationSubmission,
        now: DateTime<Utc>,
    ) -> Result<Self, StoreError> {
        let mut history = AuditTrail::new();
        history
            .append(HistoryEntry {
                version: 1,
                actor: proponent_id.clone(),
                role: Role::Proponent,
                decision: AuditDecision::Submitted,
                comment: None,
                timestamp: now,
                resulting_state: ReviewState::PendingPstoReview,
            })
            .map_err(|err| StoreError::Integrity(err.to_string()))?;

        Ok(Self {
            id,
            application_id,
            enterprise_name: submission.enterprise_name.trim().to_string(),
            proponent_id,
            state: ReviewState::PendingPstoReview,
            psto_decision: None,
            dost_decision: None,
            tna_conducted: false,
            tna_report_submitted: false,
            assessment_report: None,
            forwarded_to_dost: false,
            forwarded_at: None,
            assigned_reviewer: None,
            documents: submission.documents,
            history,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// State as computed from the decision fields.
    pub fn derived_state(&self) -> ReviewState {
        derive_state(
            self.psto_decision,
            self.dost_decision,
            self.tna_conducted,
            self.tna_report_submitted,
            self.forwarded_to_dost,
        )
    }

    /// Apply a mutation and its history entry in place. Stores call this on a scratch copy
    /// so a failure leaves the committed record untouched.
    pub fn apply_commit(
        &mut self,
        mutation: &RecordMutation,
        entry: HistoryEntry,
    ) -> Result<(), StoreError> {
        mutation.apply(self);
        self.state = self.derived_state();

        if entry.resulting_state != self.state {
            return Err(StoreError::Integrity(format!(
                "history entry claims {} but fields derive {}",
                entry.resulting_state, self.state
            )));
        }

        let timestamp = entry.timestamp;
        self.history
            .append(entry)
            .map_err(|err| StoreError::Integrity(err.to_string()))?;
        self.version += 1;
        self.updated_at = timestamp;

        let violations = guards::invariant_violations(self);
        if !violations.is_empty() {
            return Err(StoreError::Integrity(violations.join("; ")));
        }
        Ok(())
    }

    pub fn summary(&self) -> RecordSummary {
        RecordSummary {
            id: self.id,
            application_id: self.application_id.clone(),
            state: self.state,
            version: self.version,
            updated_at: self.updated_at,
        }
    }

    pub fn listing(&self) -> ApplicationListing {
        ApplicationListing {
            id: self.id,
            application_id: self.application_id.clone(),
            enterprise_name: self.enterprise_name.clone(),
            state: self.state.label(),
            assigned_reviewer: self.assigned_reviewer.clone(),
            version: self.version,
            can_forward: guards::can_forward(self),
            updated_at: self.updated_at,
        }
    }
}

/// What a transition hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSummary {
    pub id: RecordId,
    pub application_id: ApplicationId,
    pub state: ReviewState,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

/// Row shown in reviewer queues.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationListing {
    pub id: RecordId,
    pub application_id: ApplicationId,
    pub enterprise_name: String,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_reviewer: Option<ActorId>,
    pub version: u64,
    pub can_forward: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApplicationFilter {
    #[serde(default)]
    pub state: Option<ReviewState>,
    #[serde(default)]
    pub assigned_reviewer: Option<ActorId>,
}

impl ApplicationFilter {
    pub fn matches(&self, record: &ApplicationRecord) -> bool {
        self.state.map_or(true, |state| record.state == state)
            && self
                .assigned_reviewer
                .as_ref()
                .map_or(true, |reviewer| record.assigned_reviewer.as_ref() == Some(reviewer))
    }
}

/// Everything a single compare-and-swap write carries.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub expected_version: u64,
    pub mutation: RecordMutation,
    pub entry: HistoryEntry,
    pub event: TransitionEvent,
}

/// Storage abstraction. `commit` must be all-or-nothing: record fields, the history entry,
/// the version bump, and the pending outbox event land together or not at all.
pub trait ApplicationStore: Send + Sync {
    fn insert(
        &self,
        record: ApplicationRecord,
        event: TransitionEvent,
    ) -> Result<ApplicationRecord, StoreError>;
    fn load(&self, id: &RecordId) -> Result<ApplicationRecord, StoreError>;
    fn commit(
        &self,
        id: &RecordId,
        request: CommitRequest,
    ) -> Result<ApplicationRecord, StoreError>;
    fn list(&self, filter: &ApplicationFilter) -> Result<Vec<ApplicationRecord>, StoreError>;
    fn undelivered_events(&self, limit: usize) -> Result<Vec<TransitionEvent>, StoreError>;
    fn mark_delivered(&self, event_id: &EventId) -> Result<(), StoreError>;
    /// Set the reviewer queue a record appears in. Touches no decision field, history entry,
    /// or version.
    fn assign_reviewer(
        &self,
        id: &RecordId,
        reviewer: ActorId,
    ) -> Result<ApplicationRecord, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("application {0} not found")]
    NotFound(RecordId),
    #[error("application {0} already exists")]
    Duplicate(RecordId),
    #[error("application code {0} is already in use")]
    DuplicateApplicationCode(ApplicationId),
    #[error("stale version (expected {expected}, stored {actual})")]
    VersionConflict { expected: u64, actual: u64 },
    #[error("record integrity check failed: {0}")]
    Integrity(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
