//! The notifier service: persist, publish, push.
//!
//! Creating a notification does three things, in order of durability:
//!
//! 1. persists the row (the only step whose failure is an error),
//! 2. publishes a `notification.created` event to the durable pipe,
//! 3. pushes a frame to the recipient's live channels (or all channels for
//!    a broadcast).
//!
//! Steps 2 and 3 are best-effort: failures are logged and never propagate,
//! because the persisted row is the durable record and a push channel that
//! is down at send time simply catches up from storage on reconnect.

use crate::error::NotifyError;
use crate::notification::Notification;
use crate::push::{PushFrame, PushRegistry};
use crate::store::NotificationStore;
use caseflow_events::{DomainEvent, Envelope, EventPublisher};
use caseflow_core::UserId;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Creates notifications and fans them out to the pipe and live channels.
pub struct Notifier {
    store: Arc<dyn NotificationStore>,
    publisher: Arc<dyn EventPublisher>,
    push: Arc<PushRegistry>,
}

impl Notifier {
    /// Creates a new notifier.
    pub fn new(
        store: Arc<dyn NotificationStore>,
        publisher: Arc<dyn EventPublisher>,
        push: Arc<PushRegistry>,
    ) -> Self {
        Self {
            store,
            publisher,
            push,
        }
    }

    /// Creates a notification, publishes its event, and pushes it live.
    ///
    /// A `None` recipient is a system-wide broadcast.
    ///
    /// # Errors
    ///
    /// Returns an error only if persisting the row fails; publication and
    /// push failures are logged and swallowed.
    pub async fn create(
        &self,
        recipient: Option<UserId>,
        category: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
        data: JsonValue,
    ) -> Result<Notification, NotifyError> {
        let notification = Notification::new(recipient, category, title, message, data);
        self.store.create(&notification).await?;

        let event = DomainEvent::NotificationCreated {
            notification_id: notification.id,
            recipient: notification.recipient.clone(),
            category: notification.category.clone(),
            title: notification.title.clone(),
            message: notification.message.clone(),
            data: notification.data.clone(),
            timestamp: notification.created_at,
        };
        if let Err(e) = self.publisher.publish(Envelope::new(event)).await {
            tracing::warn!(
                notification_id = %notification.id,
                error = %e,
                "failed to publish notification event"
            );
        }

        let frame = PushFrame::Notification {
            notification: notification.clone(),
        };
        match &notification.recipient {
            Some(user) => self.push.send_to_user(user, &frame),
            None => self.push.broadcast(&frame),
        }

        Ok(notification)
    }

    /// Returns the push registry for transport layers to connect through.
    #[must_use]
    pub fn push_registry(&self) -> Arc<PushRegistry> {
        Arc::clone(&self.push)
    }
}
