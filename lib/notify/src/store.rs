//! Notification storage trait and in-memory implementation.

use crate::error::NotifyError;
use crate::notification::Notification;
use async_trait::async_trait;
use caseflow_core::{NotificationId, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Trait for notification persistence.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persists a new notification.
    async fn create(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Returns a notification by ID.
    async fn get(&self, id: NotificationId) -> Result<Option<Notification>, NotifyError>;

    /// Lists notifications visible to a user (their own plus broadcasts),
    /// newest first. With `unread_only`, read rows are filtered out.
    async fn list_for_user(
        &self,
        user: &UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, NotifyError>;

    /// Marks a notification as read.
    async fn mark_read(&self, id: NotificationId) -> Result<(), NotifyError>;

    /// Deletes a notification. Only explicit user action reaches this.
    async fn delete(&self, id: NotificationId) -> Result<(), NotifyError>;
}

/// In-memory notification store for tests and local development.
#[derive(Clone, Default)]
pub struct InMemoryNotificationStore {
    rows: Arc<Mutex<HashMap<NotificationId, Notification>>>,
}

impl InMemoryNotificationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<NotificationId, Notification>> {
        self.rows.lock().expect("notification store lock poisoned")
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn create(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.lock().insert(notification.id, notification.clone());
        Ok(())
    }

    async fn get(&self, id: NotificationId) -> Result<Option<Notification>, NotifyError> {
        Ok(self.lock().get(&id).cloned())
    }

    async fn list_for_user(
        &self,
        user: &UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, NotifyError> {
        let mut rows: Vec<Notification> = self
            .lock()
            .values()
            .filter(|n| n.recipient.is_none() || n.recipient.as_ref() == Some(user))
            .filter(|n| !unread_only || !n.read)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn mark_read(&self, id: NotificationId) -> Result<(), NotifyError> {
        let mut rows = self.lock();
        let row = rows.get_mut(&id).ok_or(NotifyError::NotFound { id })?;
        row.mark_read();
        Ok(())
    }

    async fn delete(&self, id: NotificationId) -> Result<(), NotifyError> {
        self.lock()
            .remove(&id)
            .map(|_| ())
            .ok_or(NotifyError::NotFound { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value as JsonValue;

    fn notification_for(user: &str) -> Notification {
        Notification::new(
            Some(UserId::new(user)),
            "task_assigned",
            "New task",
            "You have work",
            JsonValue::Null,
        )
    }

    #[tokio::test]
    async fn list_includes_broadcasts() {
        let store = InMemoryNotificationStore::new();
        store.create(&notification_for("alice")).await.unwrap();
        store.create(&notification_for("bob")).await.unwrap();
        store
            .create(&Notification::new(
                None,
                "system",
                "Maintenance",
                "Back soon",
                JsonValue::Null,
            ))
            .await
            .unwrap();

        let visible = store
            .list_for_user(&UserId::new("alice"), false)
            .await
            .unwrap();
        assert_eq!(visible.len(), 2);
    }

    #[tokio::test]
    async fn unread_filter_hides_read_rows() {
        let store = InMemoryNotificationStore::new();
        let n = notification_for("alice");
        store.create(&n).await.unwrap();
        store.mark_read(n.id).await.unwrap();

        let unread = store
            .list_for_user(&UserId::new("alice"), true)
            .await
            .unwrap();
        assert!(unread.is_empty());

        let all = store
            .list_for_user(&UserId::new("alice"), false)
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].read);
        assert!(all[0].read_at.is_some());
    }

    #[tokio::test]
    async fn delete_missing_row_is_not_found() {
        let store = InMemoryNotificationStore::new();
        let result = store.delete(NotificationId::new()).await;
        assert!(matches!(result, Err(NotifyError::NotFound { .. })));
    }
}
