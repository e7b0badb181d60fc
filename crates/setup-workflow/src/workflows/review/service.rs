use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::audit::HistoryEntry;
use super::authorizer::Authorizer;
use super::domain::{
    ActorId, ApplicationId, ApplicationSubmission, DocumentKind, DocumentReference, Operation,
    RecordId, ReviewDecision, ReviewState, Role,
};
use super::events::{
    relay_undelivered_events, EventId, EventPublisher, RelayReport, TransitionEvent,
};
use super::guards::{self, GuardFailure, ReforwardPolicy};
use super::machine::{self, Plan, TransitionCommand, TransitionRejection};
use super::repository::{
    ApplicationFilter, ApplicationListing, ApplicationRecord, ApplicationStore, CommitRequest,
    RecordSummary, StoreError,
};

/// Who is calling and which record version they last saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
    pub actor: ActorId,
    pub expected_version: Option<u64>,
}

impl TransitionRequest {
    pub fn new(actor: ActorId) -> Self {
        Self {
            actor,
            expected_version: None,
        }
    }

    pub fn at_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

/// The review workflow engine: the only writer of record state and decision fields.
///
/// Holds no mutable state of its own, so one instance can be shared behind an `Arc` by any
/// number of request handlers. Each transition loads the record, checks the caller's version,
/// authorizes, plans through the state machine, and commits with compare-and-swap. Events are
/// published only after the commit is durable.
pub struct ReviewWorkflowService<S, A, P> {
    store: Arc<S>,
    authorizer: Arc<A>,
    publisher: Arc<P>,
    reforward: ReforwardPolicy,
}

impl<S, A, P> ReviewWorkflowService<S, A, P>
where
    S: ApplicationStore + 'static,
    A: Authorizer + 'static,
    P: EventPublisher + 'static,
{
    pub fn new(store: Arc<S>, authorizer: Arc<A>, publisher: Arc<P>) -> Self {
        Self {
            store,
            authorizer,
            publisher,
            reforward: ReforwardPolicy::default(),
        }
    }

    pub fn with_reforward_policy(mut self, policy: ReforwardPolicy) -> Self {
        self.reforward = policy;
        self
    }

    pub fn reforward_policy(&self) -> ReforwardPolicy {
        self.reforward
    }

    /// Open a new application on behalf of the submitting proponent.
    pub fn submit(
        &self,
        actor: &ActorId,
        submission: ApplicationSubmission,
    ) -> Result<ApplicationRecord, WorkflowError> {
        let operation = Operation::SubmitApplication;
        if !self
            .authorizer
            .authorize(actor, operation.required_role(), operation)
        {
            return Err(WorkflowError::Unauthorized {
                actor: actor.clone(),
                operation,
            });
        }

        if submission.enterprise_name.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "enterprise name must not be empty".to_string(),
            ));
        }
        if let Some(document) = submission
            .documents
            .iter()
            .find(|document| document.storage_key.trim().is_empty())
        {
            return Err(WorkflowError::Validation(format!(
                "document '{}' is missing its storage reference",
                document.name
            )));
        }

        let now = Utc::now();
        let id = RecordId::generate();
        let application_id = next_application_code();
        let record =
            ApplicationRecord::submitted(id, application_id, actor.clone(), submission, now)?;

        let event = TransitionEvent {
            event_id: EventId::generate(),
            record_id: record.id,
            application_id: record.application_id.clone(),
            operation,
            from_state: None,
            to_state: record.state,
            actor: actor.clone(),
            version: record.version,
            timestamp: now,
        };

        let stored = self.store.insert(record, event.clone())?;
        info!(
            application = %stored.application_id,
            record = %stored.id,
            proponent = %actor,
            "application submitted"
        );
        self.dispatch(&event);
        Ok(stored)
    }

    pub fn review_by_provincial_office(
        &self,
        id: &RecordId,
        request: &TransitionRequest,
        decision: ReviewDecision,
        comment: Option<String>,
    ) -> Result<RecordSummary, WorkflowError> {
        self.execute(
            id,
            request,
            TransitionCommand::ReviewByProvincialOffice { decision, comment },
            Utc::now(),
        )
    }

    pub fn resubmit_after_return(
        &self,
        id: &RecordId,
        request: &TransitionRequest,
    ) -> Result<RecordSummary, WorkflowError> {
        self.execute(
            id,
            request,
            TransitionCommand::ResubmitAfterReturn,
            Utc::now(),
        )
    }

    pub fn mark_assessment_conducted(
        &self,
        id: &RecordId,
        request: &TransitionRequest,
    ) -> Result<RecordSummary, WorkflowError> {
        self.execute(
            id,
            request,
            TransitionCommand::MarkAssessmentConducted,
            Utc::now(),
        )
    }

    pub fn submit_assessment_report(
        &self,
        id: &RecordId,
        request: &TransitionRequest,
        report_ref: &str,
    ) -> Result<RecordSummary, WorkflowError> {
        let report = DocumentReference {
            kind: DocumentKind::AssessmentReport,
            name: "Technology needs assessment report".to_string(),
            storage_key: report_ref.trim().to_string(),
        };
        self.execute(
            id,
            request,
            TransitionCommand::SubmitAssessmentReport { report },
            Utc::now(),
        )
    }

    pub fn forward_to_regional_office(
        &self,
        id: &RecordId,
        request: &TransitionRequest,
    ) -> Result<RecordSummary, WorkflowError> {
        let now = Utc::now();
        self.execute(
            id,
            request,
            TransitionCommand::ForwardToRegionalOffice { at: now },
            now,
        )
    }

    pub fn review_by_regional_office(
        &self,
        id: &RecordId,
        request: &TransitionRequest,
        decision: ReviewDecision,
        comment: Option<String>,
    ) -> Result<RecordSummary, WorkflowError> {
        self.execute(
            id,
            request,
            TransitionCommand::ReviewByRegionalOffice { decision, comment },
            Utc::now(),
        )
    }

    pub fn get_application(&self, id: &RecordId) -> Result<ApplicationRecord, WorkflowError> {
        Ok(self.store.load(id)?)
    }

    pub fn get_history(&self, id: &RecordId) -> Result<Vec<HistoryEntry>, WorkflowError> {
        let record = self.store.load(id)?;
        Ok(record.history.entries().to_vec())
    }

    pub fn list_applications(
        &self,
        filter: &ApplicationFilter,
    ) -> Result<Vec<ApplicationRecord>, WorkflowError> {
        Ok(self.store.list(filter)?)
    }

    /// Place a record in a provincial reviewer's queue.
    ///
    /// Queue placement is lookup metadata: it writes no decision field, history entry, or
    /// version, and publishes nothing. Both the assigner and the assignee must hold the
    /// provincial reviewer role.
    pub fn assign_reviewer(
        &self,
        id: &RecordId,
        assigner: &ActorId,
        reviewer: ActorId,
    ) -> Result<ApplicationListing, WorkflowError> {
        let operation = Operation::ReviewByProvincialOffice;
        let record = self.store.load(id)?;

        if !self
            .authorizer
            .authorize(assigner, Role::ProvincialReviewer, operation)
        {
            return Err(WorkflowError::Unauthorized {
                actor: assigner.clone(),
                operation,
            });
        }
        if record.state.is_terminal() {
            return Err(WorkflowError::InvalidTransition {
                operation,
                state: record.state,
            });
        }
        if !self
            .authorizer
            .authorize(&reviewer, Role::ProvincialReviewer, operation)
        {
            return Err(WorkflowError::Validation(format!(
                "{reviewer} does not hold the provincial reviewer role"
            )));
        }

        let updated = self.store.assign_reviewer(id, reviewer)?;
        info!(
            application = %updated.application_id,
            assigner = %assigner,
            reviewer = ?updated.assigned_reviewer,
            "reviewer assigned"
        );
        Ok(updated.listing())
    }

    /// Operations `actor` could invoke on the record right now.
    pub fn allowed_operations(
        &self,
        id: &RecordId,
        actor: &ActorId,
    ) -> Result<Vec<Operation>, WorkflowError> {
        let record = self.store.load(id)?;
        Ok(guards::available_operations(&record)
            .into_iter()
            .filter(|operation| self.authorize(actor, *operation, &record).is_ok())
            .collect())
    }

    /// Retry delivery for events left pending by failed or interrupted publishes.
    pub fn relay_undelivered(&self, limit: usize) -> Result<RelayReport, WorkflowError> {
        Ok(relay_undelivered_events(
            self.store.as_ref(),
            self.publisher.as_ref(),
            limit,
        )?)
    }

    fn execute(
        &self,
        id: &RecordId,
        request: &TransitionRequest,
        command: TransitionCommand,
        now: DateTime<Utc>,
    ) -> Result<RecordSummary, WorkflowError> {
        let operation = command.operation();
        let record = self.store.load(id)?;

        if let Some(expected) = request.expected_version {
            if expected != record.version {
                return Err(WorkflowError::VersionConflict {
                    expected,
                    actual: record.version,
                });
            }
        }

        self.authorize(&request.actor, operation, &record)?;

        let plan = machine::plan(&record, &command, self.reforward).map_err(|rejection| {
            debug!(
                application = %record.application_id,
                %operation,
                state = %record.state,
                ?rejection,
                "transition rejected"
            );
            WorkflowError::from(rejection)
        })?;

        let (mutation, decision, comment, resulting_state) = match plan {
            Plan::Acknowledge => {
                info!(
                    application = %record.application_id,
                    actor = %request.actor,
                    "re-forward acknowledged without a new commit"
                );
                return Ok(record.summary());
            }
            Plan::Commit {
                mutation,
                decision,
                comment,
                resulting_state,
            } => (mutation, decision, comment, resulting_state),
        };

        let next_version = record.version + 1;
        let entry = HistoryEntry {
            version: next_version,
            actor: request.actor.clone(),
            role: operation.required_role(),
            decision,
            comment,
            timestamp: now,
            resulting_state,
        };
        let event = TransitionEvent {
            event_id: EventId::generate(),
            record_id: record.id,
            application_id: record.application_id.clone(),
            operation,
            from_state: Some(record.state),
            to_state: resulting_state,
            actor: request.actor.clone(),
            version: next_version,
            timestamp: now,
        };

        let committed = self.store.commit(
            id,
            CommitRequest {
                expected_version: record.version,
                mutation,
                entry,
                event: event.clone(),
            },
        )?;

        info!(
            application = %committed.application_id,
            %operation,
            from = %record.state,
            to = %committed.state,
            version = committed.version,
            actor = %request.actor,
            "transition committed"
        );
        self.dispatch(&event);
        Ok(committed.summary())
    }

    fn authorize(
        &self,
        actor: &ActorId,
        operation: Operation,
        record: &ApplicationRecord,
    ) -> Result<(), WorkflowError> {
        let unauthorized = || WorkflowError::Unauthorized {
            actor: actor.clone(),
            operation,
        };

        if !self
            .authorizer
            .authorize(actor, operation.required_role(), operation)
        {
            return Err(unauthorized());
        }
        if operation == Operation::ResubmitAfterReturn && *actor != record.proponent_id {
            return Err(unauthorized());
        }
        Ok(())
    }

    /// Best-effort delivery. The outbox entry stays pending when this fails.
    fn dispatch(&self, event: &TransitionEvent) {
        match self.publisher.publish(event) {
            Ok(()) => {
                if let Err(err) = self.store.mark_delivered(&event.event_id) {
                    warn!(event_id = %event.event_id, error = %err, "failed to mark event delivered");
                }
            }
            Err(err) => {
                warn!(
                    event_id = %event.event_id,
                    application = %event.application_id,
                    error = %err,
                    "event publish failed; left pending in outbox"
                );
            }
        }
    }
}

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_code() -> ApplicationId {
    let sequence = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("SETUP-{sequence:06}"))
}

/// Error raised by workflow operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("application {0} not found")]
    NotFound(RecordId),
    #[error("{actor} is not authorized to {operation}")]
    Unauthorized { actor: ActorId, operation: Operation },
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("{operation} is not allowed while the application is {state}")]
    InvalidTransition {
        operation: Operation,
        state: ReviewState,
    },
    #[error("guard not satisfied: {}", .0.code())]
    GuardNotSatisfied(GuardFailure),
    #[error("version conflict (expected {expected}, current {actual})")]
    VersionConflict { expected: u64, actual: u64 },
    #[error(transparent)]
    Store(StoreError),
}

impl WorkflowError {
    pub const fn kind(&self) -> &'static str {
        match self {
            WorkflowError::NotFound(_) => "not_found",
            WorkflowError::Unauthorized { .. } => "unauthorized",
            WorkflowError::Validation(_) => "validation_error",
            WorkflowError::InvalidTransition { .. } => "invalid_transition",
            WorkflowError::GuardNotSatisfied(_) => "guard_not_satisfied",
            WorkflowError::VersionConflict { .. } => "version_conflict",
            WorkflowError::Store(StoreError::Unavailable(_)) => "store_unavailable",
            WorkflowError::Store(_) => "store_error",
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::VersionConflict { expected, actual } => {
                Self::VersionConflict { expected, actual }
            }
            other => Self::Store(other),
        }
    }
}

impl From<TransitionRejection> for WorkflowError {
    fn from(value: TransitionRejection) -> Self {
        match value {
            TransitionRejection::Validation(message) => Self::Validation(message),
            TransitionRejection::Invalid { operation, state } => {
                Self::InvalidTransition { operation, state }
            }
            TransitionRejection::Guard(failure) => Self::GuardNotSatisfied(failure),
        }
    }
}
