use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value;

use crate::workflows::review::authorizer::RoleDirectory;
use crate::workflows::review::domain::{
    ActorId, ApplicationSubmission, DocumentKind, DocumentReference, RecordId, ReviewDecision,
    Role,
};
use crate::workflows::review::events::{EventPublisher, PublishError, TransitionEvent};
use crate::workflows::review::memory::InMemoryApplicationStore;
use crate::workflows::review::repository::ApplicationRecord;
use crate::workflows::review::service::{ReviewWorkflowService, TransitionRequest};

pub(super) const PROPONENT: &str = "proponent-calapan-coco";
pub(super) const OTHER_PROPONENT: &str = "proponent-boac-foods";
pub(super) const PSTO: &str = "psto-oriental-mindoro";
pub(super) const TNA: &str = "tna-team-mimaropa";
pub(super) const DOST: &str = "dost-mimaropa-rd";
pub(super) const OTHER_PSTO: &str = "psto-marinduque";

pub(super) type TestService =
    ReviewWorkflowService<InMemoryApplicationStore, RoleDirectory, MemoryEvents>;

pub(super) fn actor(id: &str) -> ActorId {
    ActorId::new(id)
}

pub(super) fn as_actor(id: &str) -> TransitionRequest {
    TransitionRequest::new(actor(id))
}

pub(super) fn directory() -> RoleDirectory {
    RoleDirectory::new()
        .with_grant(PROPONENT, Role::Proponent)
        .with_grant(OTHER_PROPONENT, Role::Proponent)
        .with_grant(PSTO, Role::ProvincialReviewer)
        .with_grant(OTHER_PSTO, Role::ProvincialReviewer)
        .with_grant(TNA, Role::AssessmentScheduler)
        .with_grant(DOST, Role::RegionalReviewer)
}

pub(super) fn submission() -> ApplicationSubmission {
    ApplicationSubmission {
        enterprise_name: "Calapan Coco Processing".to_string(),
        documents: vec![DocumentReference {
            kind: DocumentKind::LetterOfIntent,
            name: "Letter of intent".to_string(),
            storage_key: "setup/2025/calapan-coco/loi.pdf".to_string(),
        }],
    }
}

pub(super) fn build_service() -> (TestService, Arc<InMemoryApplicationStore>, Arc<MemoryEvents>) {
    let store = Arc::new(InMemoryApplicationStore::new());
    let events = Arc::new(MemoryEvents::default());
    let service = ReviewWorkflowService::new(store.clone(), Arc::new(directory()), events.clone());
    (service, store, events)
}

pub(super) fn submitted<S, P>(service: &ReviewWorkflowService<S, RoleDirectory, P>) -> ApplicationRecord
where
    S: crate::workflows::review::repository::ApplicationStore + 'static,
    P: EventPublisher + 'static,
{
    service
        .submit(&actor(PROPONENT), submission())
        .expect("proponent can submit")
}

/// Drive a fresh record to `PstoApproved`.
pub(super) fn approved(service: &TestService) -> RecordId {
    let record = submitted(service);
    service
        .review_by_provincial_office(
            &record.id,
            &as_actor(PSTO),
            ReviewDecision::Approved,
            Some("ok".to_string()),
        )
        .expect("approval succeeds");
    record.id
}

/// Drive a fresh record to `ForwardedToDost`.
pub(super) fn forwarded(service: &TestService) -> RecordId {
    let id = approved(service);
    service
        .mark_assessment_conducted(&id, &as_actor(TNA))
        .expect("assessment conducted");
    service
        .submit_assessment_report(&id, &as_actor(TNA), "report-123")
        .expect("report submitted");
    service
        .forward_to_regional_office(&id, &as_actor(PSTO))
        .expect("forward succeeds");
    id
}

#[derive(Default, Clone)]
pub(super) struct MemoryEvents {
    events: Arc<Mutex<Vec<TransitionEvent>>>,
}

impl MemoryEvents {
    pub(super) fn events(&self) -> Vec<TransitionEvent> {
        self.events.lock().expect("event mutex poisoned").clone()
    }
}

impl EventPublisher for MemoryEvents {
    fn publish(&self, event: &TransitionEvent) -> Result<(), PublishError> {
        self.events
            .lock()
            .expect("event mutex poisoned")
            .push(event.clone());
        Ok(())
    }
}

/// Publisher that fails until `recover` is called.
#[derive(Default)]
pub(super) struct FlakyEvents {
    healthy: Mutex<bool>,
    delivered: Mutex<Vec<TransitionEvent>>,
}

impl FlakyEvents {
    pub(super) fn recover(&self) {
        *self.healthy.lock().expect("flag mutex poisoned") = true;
    }

    pub(super) fn delivered(&self) -> Vec<TransitionEvent> {
        self.delivered.lock().expect("event mutex poisoned").clone()
    }
}

impl EventPublisher for FlakyEvents {
    fn publish(&self, event: &TransitionEvent) -> Result<(), PublishError> {
        if !*self.healthy.lock().expect("flag mutex poisoned") {
            return Err(PublishError::Transport("smtp relay offline".to_string()));
        }
        self.delivered
            .lock()
            .expect("event mutex poisoned")
            .push(event.clone());
        Ok(())
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
