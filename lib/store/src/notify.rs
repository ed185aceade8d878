//! Repositories for notifications and subscriptions.

use async_trait::async_trait;
use caseflow_core::{InstanceId, NotificationId, UserId};
use caseflow_notify::{Notification, NotificationStore, NotifyError, SubscriptionStore};
use sqlx::PgPool;

fn storage_failed(e: sqlx::Error) -> NotifyError {
    NotifyError::StorageFailed {
        reason: e.to_string(),
    }
}

fn decode(reason: impl std::fmt::Display) -> NotifyError {
    NotifyError::StorageFailed {
        reason: reason.to_string(),
    }
}

/// Repository for notifications.
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn create(&self, notification: &Notification) -> Result<(), NotifyError> {
        let payload = serde_json::to_value(notification).map_err(decode)?;
        sqlx::query(
            r#"
            INSERT INTO notifications (id, recipient, read, notification, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(notification.id.to_string())
        .bind(notification.recipient.as_ref().map(ToString::to_string))
        .bind(notification.read)
        .bind(&payload)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_failed)?;
        Ok(())
    }

    async fn get(&self, id: NotificationId) -> Result<Option<Notification>, NotifyError> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT notification FROM notifications WHERE id = $1")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_failed)?;

        match row {
            Some((payload,)) => Ok(Some(serde_json::from_value(payload).map_err(decode)?)),
            None => Ok(None),
        }
    }

    async fn list_for_user(
        &self,
        user: &UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, NotifyError> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            r#"
            SELECT notification
            FROM notifications
            WHERE (recipient = $1 OR recipient IS NULL)
              AND (NOT $2 OR NOT read)
            ORDER BY created_at DESC
            "#,
        )
        .bind(user.to_string())
        .bind(unread_only)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_failed)?;

        rows.into_iter()
            .map(|(payload,)| serde_json::from_value(payload).map_err(decode))
            .collect()
    }

    async fn mark_read(&self, id: NotificationId) -> Result<(), NotifyError> {
        let mut notification = self
            .get(id)
            .await?
            .ok_or(NotifyError::NotFound { id })?;
        notification.mark_read();

        let payload = serde_json::to_value(&notification).map_err(decode)?;
        sqlx::query(
            r#"
            UPDATE notifications
            SET read = TRUE, notification = $2
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .bind(&payload)
        .execute(&self.pool)
        .await
        .map_err(storage_failed)?;
        Ok(())
    }

    async fn delete(&self, id: NotificationId) -> Result<(), NotifyError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(storage_failed)?;

        if result.rows_affected() == 0 {
            return Err(NotifyError::NotFound { id });
        }
        Ok(())
    }
}

/// Repository for instance subscriptions.
pub struct PgSubscriptionStore {
    pool: PgPool,
}

impl PgSubscriptionStore {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn subscribe(&self, user: &UserId, instance_id: InstanceId) -> Result<(), NotifyError> {
        sqlx::query(
            r#"
            INSERT INTO instance_subscriptions (user_id, instance_id, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id, instance_id) DO NOTHING
            "#,
        )
        .bind(user.to_string())
        .bind(instance_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(storage_failed)?;
        Ok(())
    }

    async fn unsubscribe(
        &self,
        user: &UserId,
        instance_id: InstanceId,
    ) -> Result<(), NotifyError> {
        sqlx::query(
            "DELETE FROM instance_subscriptions WHERE user_id = $1 AND instance_id = $2",
        )
        .bind(user.to_string())
        .bind(instance_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(storage_failed)?;
        Ok(())
    }

    async fn subscribers_of(&self, instance_id: InstanceId) -> Result<Vec<UserId>, NotifyError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT user_id
            FROM instance_subscriptions
            WHERE instance_id = $1
            ORDER BY user_id ASC
            "#,
        )
        .bind(instance_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_failed)?;

        Ok(rows.into_iter().map(|(user,)| UserId::new(user)).collect())
    }
}
