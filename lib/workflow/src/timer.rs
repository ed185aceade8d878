//! Durable timers.
//!
//! A timer node parks its instance and writes a due-at record. A periodic
//! sweep claims every overdue record and resumes the owning instances, so a
//! process restart cannot silently lose scheduled work. Claiming removes the
//! record before the resume runs, which keeps concurrent sweeps idempotent:
//! a record fires at most once.

use crate::error::StoreError;
use async_trait::async_trait;
use caseflow_core::{InstanceId, TimerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// A persisted "resume this instance at this time" record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerRecord {
    /// Unique identifier.
    pub id: TimerId,
    /// The instance to resume.
    pub instance_id: InstanceId,
    /// When the instance becomes due.
    pub due_at: DateTime<Utc>,
    /// When the record was written.
    pub created_at: DateTime<Utc>,
}

impl TimerRecord {
    /// Creates a record due after the given delay.
    #[must_use]
    pub fn after(instance_id: InstanceId, delay: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            id: TimerId::new(),
            instance_id,
            due_at: now + delay,
            created_at: now,
        }
    }
}

/// Trait for timer persistence.
#[async_trait]
pub trait TimerStore: Send + Sync {
    /// Persists a timer record.
    async fn schedule(&self, record: &TimerRecord) -> Result<(), StoreError>;

    /// Removes and returns every record due at or before `now`.
    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<TimerRecord>, StoreError>;

    /// Returns pending (unclaimed) records, soonest first.
    async fn pending(&self) -> Result<Vec<TimerRecord>, StoreError>;
}

/// In-memory timer store for tests and local development.
#[derive(Clone, Default)]
pub struct InMemoryTimerStore {
    records: Arc<Mutex<Vec<TimerRecord>>>,
}

impl InMemoryTimerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TimerStore for InMemoryTimerStore {
    async fn schedule(&self, record: &TimerRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .expect("timer store lock poisoned")
            .push(record.clone());
        Ok(())
    }

    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<TimerRecord>, StoreError> {
        let mut records = self.records.lock().expect("timer store lock poisoned");
        let (due, remaining): (Vec<_>, Vec<_>) =
            records.drain(..).partition(|r| r.due_at <= now);
        *records = remaining;
        let mut due = due;
        due.sort_by_key(|r| r.due_at);
        Ok(due)
    }

    async fn pending(&self) -> Result<Vec<TimerRecord>, StoreError> {
        let mut pending = self
            .records
            .lock()
            .expect("timer store lock poisoned")
            .clone();
        pending.sort_by_key(|r| r.due_at);
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn claim_due_removes_only_overdue_records() {
        let store = InMemoryTimerStore::new();
        let overdue = TimerRecord::after(InstanceId::new(), chrono::Duration::milliseconds(-1));
        let future = TimerRecord::after(InstanceId::new(), chrono::Duration::hours(1));
        store.schedule(&overdue).await.unwrap();
        store.schedule(&future).await.unwrap();

        let claimed = store.claim_due(Utc::now()).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, overdue.id);

        let pending = store.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, future.id);
    }

    #[tokio::test]
    async fn claim_is_exactly_once() {
        let store = InMemoryTimerStore::new();
        let record = TimerRecord::after(InstanceId::new(), chrono::Duration::zero());
        store.schedule(&record).await.unwrap();

        assert_eq!(store.claim_due(Utc::now()).await.unwrap().len(), 1);
        assert!(store.claim_due(Utc::now()).await.unwrap().is_empty());
    }
}
