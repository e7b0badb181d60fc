//! Application review workflow: provincial review, technology needs assessment, forwarding,
//! and the regional office's final decision.
//!
//! [`ReviewWorkflowService`] is the only writer of review state. It plans each request through
//! the state machine in [`machine`], checks business guards from [`guards`], and commits through
//! an [`ApplicationStore`] with optimistic versioning.

pub mod audit;
pub mod authorizer;
pub mod domain;
pub mod events;
pub mod guards;
pub mod machine;
pub mod memory;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use audit::{AuditDecision, AuditError, AuditTrail, HistoryEntry};
pub use authorizer::{Authorizer, RoleDirectory};
pub use domain::{
    ActorId, ApplicationId, ApplicationSubmission, DocumentKind, DocumentReference, DostDecision,
    Operation, PstoDecision, RecordId, ReviewDecision, ReviewState, Role,
};
pub use events::{
    relay_undelivered_events, EventId, EventPublisher, PublishError, RelayReport,
    TransitionEvent,
};
pub use guards::{can_forward, forward_blocker, GuardFailure, ReforwardPolicy};
pub use memory::InMemoryApplicationStore;
pub use repository::{
    ApplicationFilter, ApplicationListing, ApplicationRecord, ApplicationStore, CommitRequest,
    RecordSummary, StoreError,
};
pub use router::{review_router, ACTOR_HEADER};
pub use service::{ReviewWorkflowService, TransitionRequest, WorkflowError};
