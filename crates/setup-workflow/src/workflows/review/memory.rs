//! In-memory implementation of [`ApplicationStore`].
//!
//! Records and the outbox share one mutex so a commit updates both or neither. The lock is only
//! held for the compare-and-swap itself; callers never hold it across an operation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::domain::{ActorId, ApplicationId, RecordId};
use super::events::{EventId, TransitionEvent};
use super::guards;
use super::repository::{
    ApplicationFilter, ApplicationRecord, ApplicationStore, CommitRequest, StoreError,
};

/// Pending events keyed by commit sequence. Delivered events are removed.
#[derive(Debug, Default)]
struct Outbox {
    next_sequence: u64,
    pending: BTreeMap<u64, TransitionEvent>,
    sequence_of: HashMap<EventId, u64>,
}

impl Outbox {
    fn push(&mut self, event: TransitionEvent) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.sequence_of.insert(event.event_id, sequence);
        self.pending.insert(sequence, event);
    }

    fn remove(&mut self, event_id: &EventId) {
        if let Some(sequence) = self.sequence_of.remove(event_id) {
            self.pending.remove(&sequence);
        }
    }

    fn len(&self) -> usize {
        self.pending.len()
    }
}

#[derive(Debug, Default)]
struct StoreState {
    records: HashMap<RecordId, ApplicationRecord>,
    codes: HashSet<ApplicationId>,
    outbox: Outbox,
}

#[derive(Debug, Default)]
pub struct InMemoryApplicationStore {
    state: Mutex<StoreState>,
}

impl InMemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))
    }

    /// Number of events held in the outbox, all of them awaiting confirmed delivery.
    pub fn pending_event_count(&self) -> Result<usize, StoreError> {
        let state = self.lock()?;
        Ok(state.outbox.len())
    }
}

impl ApplicationStore for InMemoryApplicationStore {
    fn insert(
        &self,
        record: ApplicationRecord,
        event: TransitionEvent,
    ) -> Result<ApplicationRecord, StoreError> {
        let violations = guards::invariant_violations(&record);
        if !violations.is_empty() {
            return Err(StoreError::Integrity(violations.join("; ")));
        }

        let mut state = self.lock()?;
        if state.records.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id));
        }
        if state.codes.contains(&record.application_id) {
            return Err(StoreError::DuplicateApplicationCode(record.application_id));
        }
        state.codes.insert(record.application_id.clone());
        state.records.insert(record.id, record.clone());
        state.outbox.push(event);
        Ok(record)
    }

    fn load(&self, id: &RecordId) -> Result<ApplicationRecord, StoreError> {
        let state = self.lock()?;
        state
            .records
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound(*id))
    }

    fn commit(
        &self,
        id: &RecordId,
        request: CommitRequest,
    ) -> Result<ApplicationRecord, StoreError> {
        let mut state = self.lock()?;
        let current = state.records.get(id).ok_or(StoreError::NotFound(*id))?;

        if current.version != request.expected_version {
            return Err(StoreError::VersionConflict {
                expected: request.expected_version,
                actual: current.version,
            });
        }

        let mut next = current.clone();
        next.apply_commit(&request.mutation, request.entry)?;

        state.records.insert(*id, next.clone());
        state.outbox.push(request.event);
        Ok(next)
    }

    fn list(&self, filter: &ApplicationFilter) -> Result<Vec<ApplicationRecord>, StoreError> {
        let state = self.lock()?;
        let mut records: Vec<ApplicationRecord> = state
            .records
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.application_id.cmp(&b.application_id));
        Ok(records)
    }

    fn undelivered_events(&self, limit: usize) -> Result<Vec<TransitionEvent>, StoreError> {
        let state = self.lock()?;
        Ok(state.outbox.pending.values().take(limit).cloned().collect())
    }

    fn mark_delivered(&self, event_id: &EventId) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.outbox.remove(event_id);
        Ok(())
    }

    fn assign_reviewer(
        &self,
        id: &RecordId,
        reviewer: ActorId,
    ) -> Result<ApplicationRecord, StoreError> {
        let mut state = self.lock()?;
        let record = state.records.get_mut(id).ok_or(StoreError::NotFound(*id))?;
        record.assigned_reviewer = Some(reviewer);
        Ok(record.clone())
    }
}
