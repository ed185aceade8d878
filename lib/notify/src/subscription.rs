//! Instance progress subscriptions.
//!
//! A subscription records that a user wants push notifications about an
//! instance's progress without being a task assignee. Unique per
//! (user, instance); created and destroyed only by explicit user action.

use crate::error::NotifyError;
use async_trait::async_trait;
use caseflow_core::{InstanceId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// A (user, instance) subscription pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// The subscribed user.
    pub user: UserId,
    /// The instance being watched.
    pub instance_id: InstanceId,
    /// When the subscription was created.
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Creates a new subscription.
    #[must_use]
    pub fn new(user: UserId, instance_id: InstanceId) -> Self {
        Self {
            user,
            instance_id,
            created_at: Utc::now(),
        }
    }
}

/// Trait for subscription persistence.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Records a subscription. Idempotent: subscribing twice is a no-op.
    async fn subscribe(&self, user: &UserId, instance_id: InstanceId) -> Result<(), NotifyError>;

    /// Removes a subscription if present.
    async fn unsubscribe(&self, user: &UserId, instance_id: InstanceId)
    -> Result<(), NotifyError>;

    /// Returns every user subscribed to an instance.
    async fn subscribers_of(&self, instance_id: InstanceId) -> Result<Vec<UserId>, NotifyError>;
}

/// In-memory subscription store for tests and local development.
#[derive(Clone, Default)]
pub struct InMemorySubscriptionStore {
    pairs: Arc<Mutex<HashSet<(UserId, InstanceId)>>>,
}

impl InMemorySubscriptionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn subscribe(&self, user: &UserId, instance_id: InstanceId) -> Result<(), NotifyError> {
        self.pairs
            .lock()
            .expect("subscription store lock poisoned")
            .insert((user.clone(), instance_id));
        Ok(())
    }

    async fn unsubscribe(
        &self,
        user: &UserId,
        instance_id: InstanceId,
    ) -> Result<(), NotifyError> {
        self.pairs
            .lock()
            .expect("subscription store lock poisoned")
            .remove(&(user.clone(), instance_id));
        Ok(())
    }

    async fn subscribers_of(&self, instance_id: InstanceId) -> Result<Vec<UserId>, NotifyError> {
        let mut users: Vec<UserId> = self
            .pairs
            .lock()
            .expect("subscription store lock poisoned")
            .iter()
            .filter(|(_, inst)| *inst == instance_id)
            .map(|(user, _)| user.clone())
            .collect();
        users.sort();
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_is_idempotent() {
        let store = InMemorySubscriptionStore::new();
        let user = UserId::new("alice");
        let instance = InstanceId::new();

        store.subscribe(&user, instance).await.unwrap();
        store.subscribe(&user, instance).await.unwrap();

        let subs = store.subscribers_of(instance).await.unwrap();
        assert_eq!(subs, vec![user]);
    }

    #[tokio::test]
    async fn unsubscribe_removes_pair() {
        let store = InMemorySubscriptionStore::new();
        let user = UserId::new("bob");
        let instance = InstanceId::new();

        store.subscribe(&user, instance).await.unwrap();
        store.unsubscribe(&user, instance).await.unwrap();

        assert!(store.subscribers_of(instance).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn subscribers_are_scoped_to_instance() {
        let store = InMemorySubscriptionStore::new();
        let watched = InstanceId::new();
        let other = InstanceId::new();

        store.subscribe(&UserId::new("alice"), watched).await.unwrap();
        store.subscribe(&UserId::new("bob"), other).await.unwrap();

        let subs = store.subscribers_of(watched).await.unwrap();
        assert_eq!(subs, vec![UserId::new("alice")]);
    }
}
