//! Integration specifications for the SETUP application review workflow.
//!
//! Scenarios drive the public service facade and HTTP router with pluggable stores,
//! authorizers, and publishers, without reaching into private modules.

mod common {
    use std::sync::{Arc, Mutex};

    use setup_workflow::workflows::review::{
        ActorId, ApplicationFilter, ApplicationRecord, ApplicationStore, ApplicationSubmission,
        Authorizer, CommitRequest, DocumentKind, DocumentReference, EventId, EventPublisher,
        InMemoryApplicationStore, Operation, PublishError, RecordId, ReviewWorkflowService, Role,
        RoleDirectory, StoreError, TransitionEvent,
    };

    pub(super) const PROPONENT: &str = "proponent-romblon-marble";
    pub(super) const PSTO: &str = "psto-romblon";
    pub(super) const TNA: &str = "tna-romblon";
    pub(super) const DOST: &str = "dost-mimaropa";

    pub(super) fn submission() -> ApplicationSubmission {
        ApplicationSubmission {
            enterprise_name: "Romblon Marble Crafts".to_string(),
            documents: vec![
                DocumentReference {
                    kind: DocumentKind::LetterOfIntent,
                    name: "Letter of intent".to_string(),
                    storage_key: "setup/romblon-marble/loi.pdf".to_string(),
                },
                DocumentReference {
                    kind: DocumentKind::BusinessPermit,
                    name: "Mayor's permit".to_string(),
                    storage_key: "setup/romblon-marble/permit.pdf".to_string(),
                },
            ],
        }
    }

    pub(super) fn directory() -> RoleDirectory {
        RoleDirectory::from_grants(&[
            (PROPONENT.to_string(), Role::Proponent),
            (PSTO.to_string(), Role::ProvincialReviewer),
            (TNA.to_string(), Role::AssessmentScheduler),
            (DOST.to_string(), Role::RegionalReviewer),
        ])
    }

    #[derive(Default, Clone)]
    pub(super) struct RecordingPublisher {
        events: Arc<Mutex<Vec<TransitionEvent>>>,
    }

    impl RecordingPublisher {
        pub(super) fn events(&self) -> Vec<TransitionEvent> {
            self.events.lock().expect("publisher mutex poisoned").clone()
        }
    }

    impl EventPublisher for RecordingPublisher {
        fn publish(&self, event: &TransitionEvent) -> Result<(), PublishError> {
            self.events
                .lock()
                .expect("publisher mutex poisoned")
                .push(event.clone());
            Ok(())
        }
    }

    /// Every actor may act in every role. Used to show the engine still enforces ownership.
    pub(super) struct PermitAll;

    impl Authorizer for PermitAll {
        fn authorize(&self, _actor: &ActorId, _role: Role, _operation: Operation) -> bool {
            true
        }
    }

    pub(super) struct OfflineStore;

    impl ApplicationStore for OfflineStore {
        fn insert(
            &self,
            _record: ApplicationRecord,
            _event: TransitionEvent,
        ) -> Result<ApplicationRecord, StoreError> {
            Err(StoreError::Unavailable("database offline".to_string()))
        }

        fn load(&self, _id: &RecordId) -> Result<ApplicationRecord, StoreError> {
            Err(StoreError::Unavailable("database offline".to_string()))
        }

        fn commit(
            &self,
            _id: &RecordId,
            _request: CommitRequest,
        ) -> Result<ApplicationRecord, StoreError> {
            Err(StoreError::Unavailable("database offline".to_string()))
        }

        fn list(&self, _filter: &ApplicationFilter) -> Result<Vec<ApplicationRecord>, StoreError> {
            Err(StoreError::Unavailable("database offline".to_string()))
        }

        fn undelivered_events(&self, _limit: usize) -> Result<Vec<TransitionEvent>, StoreError> {
            Err(StoreError::Unavailable("database offline".to_string()))
        }

        fn mark_delivered(&self, _event_id: &EventId) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("database offline".to_string()))
        }

        fn assign_reviewer(
            &self,
            _id: &RecordId,
            _reviewer: ActorId,
        ) -> Result<ApplicationRecord, StoreError> {
            Err(StoreError::Unavailable("database offline".to_string()))
        }
    }

    pub(super) type Service =
        ReviewWorkflowService<InMemoryApplicationStore, RoleDirectory, RecordingPublisher>;

    pub(super) fn build_service() -> (Service, Arc<InMemoryApplicationStore>, RecordingPublisher) {
        let store = Arc::new(InMemoryApplicationStore::new());
        let publisher = RecordingPublisher::default();
        let service = ReviewWorkflowService::new(
            store.clone(),
            Arc::new(directory()),
            Arc::new(publisher.clone()),
        );
        (service, store, publisher)
    }
}

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use setup_workflow::workflows::review::{
    can_forward, review_router, ActorId, ApplicationStore, AuditDecision, GuardFailure,
    InMemoryApplicationStore, ReviewDecision, ReviewState, ReviewWorkflowService,
    TransitionRequest, WorkflowError, ACTOR_HEADER,
};
use tower::ServiceExt;

use common::*;

fn request(actor: &str) -> TransitionRequest {
    TransitionRequest::new(ActorId::new(actor))
}

#[test]
fn application_travels_from_submission_to_regional_approval() {
    let (service, store, publisher) = build_service();

    let record = service
        .submit(&ActorId::new(PROPONENT), submission())
        .expect("submission accepted");
    let id = record.id;

    let approved = service
        .review_by_provincial_office(&id, &request(PSTO), ReviewDecision::Approved, Some("ok".into()))
        .expect("provincial approval");
    assert_eq!(approved.state, ReviewState::PstoApproved);

    match service.forward_to_regional_office(&id, &request(PSTO)) {
        Err(WorkflowError::GuardNotSatisfied(GuardFailure::AssessmentNotConducted)) => {}
        other => panic!("expected assessment guard, got {other:?}"),
    }

    service
        .mark_assessment_conducted(&id, &request(TNA).at_version(2))
        .expect("assessment conducted");
    service
        .submit_assessment_report(&id, &request(TNA).at_version(3), "report-123")
        .expect("report submitted");
    assert!(can_forward(&store.load(&id).expect("record exists")));

    let forwarded = service
        .forward_to_regional_office(&id, &request(PSTO).at_version(4))
        .expect("forwarded");
    assert_eq!(forwarded.state, ReviewState::ForwardedToDost);

    let decided = service
        .review_by_regional_office(&id, &request(DOST), ReviewDecision::Approved, None)
        .expect("regional approval");
    assert_eq!(decided.state, ReviewState::DostApproved);
    assert_eq!(decided.version, 6);

    let history = service.get_history(&id).expect("history loads");
    let decisions: Vec<AuditDecision> = history.iter().map(|entry| entry.decision).collect();
    assert_eq!(
        decisions,
        vec![
            AuditDecision::Submitted,
            AuditDecision::Approved,
            AuditDecision::AssessmentConducted,
            AuditDecision::AssessmentReportSubmitted,
            AuditDecision::Forwarded,
            AuditDecision::Approved,
        ]
    );
    assert_eq!(history[5].actor, ActorId::new(DOST));

    let versions: Vec<u64> = publisher.events().iter().map(|event| event.version).collect();
    assert_eq!(versions, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(store.pending_event_count().expect("outbox readable"), 0);

    let mut csv = Vec::new();
    store
        .load(&id)
        .expect("record exists")
        .history
        .write_csv(&mut csv)
        .expect("csv export");
    let csv = String::from_utf8(csv).expect("utf-8");
    assert!(csv.contains("assessment_report_submitted"));
    assert!(csv.contains(DOST));
}

#[test]
fn ownership_is_enforced_even_when_roles_are_permissive() {
    let store = Arc::new(InMemoryApplicationStore::new());
    let service = ReviewWorkflowService::new(
        store,
        Arc::new(PermitAll),
        Arc::new(RecordingPublisher::default()),
    );

    let record = service
        .submit(&ActorId::new(PROPONENT), submission())
        .expect("submission accepted");
    service
        .review_by_provincial_office(
            &record.id,
            &request(PSTO),
            ReviewDecision::Returned,
            Some("attach financial statements".into()),
        )
        .expect("returned");

    assert!(matches!(
        service.resubmit_after_return(&record.id, &request("someone-else")),
        Err(WorkflowError::Unauthorized { .. })
    ));
    let resubmitted = service
        .resubmit_after_return(&record.id, &request(PROPONENT))
        .expect("owner resubmits");
    assert_eq!(resubmitted.state, ReviewState::PendingPstoReview);
}

#[test]
fn store_outage_surfaces_as_store_error() {
    let service = ReviewWorkflowService::new(
        Arc::new(OfflineStore),
        Arc::new(directory()),
        Arc::new(RecordingPublisher::default()),
    );

    let error = service
        .submit(&ActorId::new(PROPONENT), submission())
        .expect_err("store is offline");
    assert_eq!(error.kind(), "store_unavailable");
}

#[tokio::test]
async fn router_reports_store_outage_as_service_unavailable() {
    let service = Arc::new(ReviewWorkflowService::new(
        Arc::new(OfflineStore),
        Arc::new(directory()),
        Arc::new(RecordingPublisher::default()),
    ));
    let router = review_router(service);

    let response = router
        .oneshot(
            Request::get("/api/v1/applications")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn router_drives_return_and_resubmission() {
    let (service, _, _) = build_service();
    let router = review_router(Arc::new(service));

    let created = router
        .clone()
        .oneshot(
            Request::post("/api/v1/applications")
                .header(header::CONTENT_TYPE, "application/json")
                .header(ACTOR_HEADER, PROPONENT)
                .body(Body::from(serde_json::to_vec(&submission()).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let body = axum::body::to_bytes(created.into_body(), 16 * 1024)
        .await
        .unwrap();
    let payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let id = payload["id"].as_str().expect("record id").to_string();

    let returned = router
        .clone()
        .oneshot(
            Request::post(format!("/api/v1/applications/{id}/provincial-review"))
                .header(header::CONTENT_TYPE, "application/json")
                .header(ACTOR_HEADER, PSTO)
                .body(Body::from(
                    r#"{"decision":"returned","comment":"missing docs"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(returned.status(), StatusCode::OK);

    let resubmitted = router
        .oneshot(
            Request::post(format!("/api/v1/applications/{id}/resubmit"))
                .header(header::CONTENT_TYPE, "application/json")
                .header(ACTOR_HEADER, PROPONENT)
                .body(Body::from(r#"{"expected_version":2}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resubmitted.status(), StatusCode::OK);
    let body = axum::body::to_bytes(resubmitted.into_body(), 16 * 1024)
        .await
        .unwrap();
    let payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(payload["state"], "pending_psto_review");
    assert_eq!(payload["version"], 3);
}
