use super::common::*;
use std::sync::Arc;

use crate::workflows::review::domain::{Operation, ReviewDecision, ReviewState};
use crate::workflows::review::events::RelayReport;
use crate::workflows::review::memory::InMemoryApplicationStore;
use crate::workflows::review::service::ReviewWorkflowService;

#[test]
fn failed_publish_does_not_roll_back_commit() {
    let store = Arc::new(InMemoryApplicationStore::new());
    let publisher = Arc::new(FlakyEvents::default());
    let service = ReviewWorkflowService::new(store.clone(), Arc::new(directory()), publisher.clone());

    let record = submitted(&service);
    let summary = service
        .review_by_provincial_office(
            &record.id,
            &as_actor(PSTO),
            ReviewDecision::Approved,
            Some("complete requirements".to_string()),
        )
        .expect("commit survives publish failure");

    assert_eq!(summary.state, ReviewState::PstoApproved);
    assert!(publisher.delivered().is_empty());
    assert_eq!(store.pending_event_count().expect("outbox readable"), 2);
}

#[test]
fn relay_redelivers_pending_events_in_commit_order() {
    let store = Arc::new(InMemoryApplicationStore::new());
    let publisher = Arc::new(FlakyEvents::default());
    let service = ReviewWorkflowService::new(store.clone(), Arc::new(directory()), publisher.clone());

    let record = submitted(&service);
    service
        .review_by_provincial_office(&record.id, &as_actor(PSTO), ReviewDecision::Approved, None)
        .expect("approval commits");

    let report = service.relay_undelivered(10).expect("relay runs");
    assert_eq!(
        report,
        RelayReport {
            delivered: 0,
            failed: 2
        }
    );

    publisher.recover();
    let report = service.relay_undelivered(1).expect("relay runs");
    assert_eq!(report.delivered, 1);
    assert_eq!(store.pending_event_count().expect("outbox readable"), 1);

    let report = service.relay_undelivered(10).expect("relay runs");
    assert_eq!(report.delivered, 1);
    assert_eq!(store.pending_event_count().expect("outbox readable"), 0);

    let delivered = publisher.delivered();
    let operations: Vec<Operation> = delivered.iter().map(|event| event.operation).collect();
    assert_eq!(
        operations,
        vec![
            Operation::SubmitApplication,
            Operation::ReviewByProvincialOffice
        ]
    );
    assert_eq!(delivered[1].version, 2);

    let report = service.relay_undelivered(10).expect("relay runs");
    assert_eq!(report, RelayReport::default());
}

#[test]
fn rejected_transitions_publish_nothing() {
    let (service, store, events) = build_service();
    let id = approved(&service);
    let published = events.events().len();

    assert!(service.forward_to_regional_office(&id, &as_actor(PSTO)).is_err());
    assert!(service
        .mark_assessment_conducted(&id, &as_actor(PROPONENT))
        .is_err());

    assert_eq!(events.events().len(), published);
    assert_eq!(store.pending_event_count().expect("outbox readable"), 0);
}

#[test]
fn outbox_empties_once_lifecycles_are_delivered() {
    let (service, store, events) = build_service();
    for _ in 0..20 {
        let id = forwarded(&service);
        service
            .review_by_regional_office(&id, &as_actor(DOST), ReviewDecision::Approved, None)
            .expect("regional approval");
    }

    assert_eq!(events.events().len(), 20 * 6);
    assert_eq!(store.pending_event_count().expect("outbox readable"), 0);
    assert_eq!(
        service.relay_undelivered(usize::MAX).expect("relay runs"),
        RelayReport::default()
    );
}
