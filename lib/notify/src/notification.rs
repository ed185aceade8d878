//! Notification records.
//!
//! A notification is the durable form of "something a user should see". Push
//! delivery is best-effort; the persisted row is the record of truth and the
//! only thing a reconnecting client can rely on.

use caseflow_core::{NotificationId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A persisted notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique identifier.
    pub id: NotificationId,
    /// The recipient; `None` means a system-wide broadcast visible to all.
    pub recipient: Option<UserId>,
    /// Free-form category (e.g. "task_assigned", "workflow_progress").
    pub category: String,
    /// Short headline.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Structured context for the calling surface.
    pub data: JsonValue,
    /// Whether the recipient has read it.
    pub read: bool,
    /// When it was read.
    pub read_at: Option<DateTime<Utc>>,
    /// When it was created.
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Creates a new unread notification.
    #[must_use]
    pub fn new(
        recipient: Option<UserId>,
        category: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
        data: JsonValue,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            recipient,
            category: category.into(),
            title: title.into(),
            message: message.into(),
            data,
            read: false,
            read_at: None,
            created_at: Utc::now(),
        }
    }

    /// Returns true if this is a broadcast (no specific recipient).
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.recipient.is_none()
    }

    /// Marks the notification as read.
    pub fn mark_read(&mut self) {
        self.read = true;
        self.read_at = Some(Utc::now());
    }
}
