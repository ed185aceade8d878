//! Live push-channel registry.
//!
//! The registry maps a user id to the set of push channels that user
//! currently has open (one per browser tab or device). Delivery is
//! fire-and-forget: a slow or dead consumer never blocks the sender, and a
//! channel whose receiver has gone away is pruned on the next write to it.
//!
//! The wire protocol on a channel is a stream of discrete JSON frames. The
//! first frame after connecting is a connection acknowledgement carrying the
//! channel id; keep-alive frames are emitted on an external schedule to
//! defeat idle timeouts.

use crate::notification::Notification;
use caseflow_core::UserId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use ulid::Ulid;

/// A single frame on a push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushFrame {
    /// First frame after connect, acknowledging the channel.
    Connected { channel_id: String },
    /// A notification delivered live.
    Notification { notification: Notification },
    /// No-op frame to keep idle connections alive.
    KeepAlive,
}

struct PushChannel {
    id: Ulid,
    sender: mpsc::UnboundedSender<PushFrame>,
}

/// An open push channel as seen by the transport layer.
///
/// The transport forwards frames from `receiver` to the client and calls
/// [`PushRegistry::disconnect`] when the underlying connection closes.
pub struct PushConnection {
    /// The channel id, echoed in the connection-acknowledgement frame.
    pub channel_id: String,
    /// The stream of frames to forward to the client.
    pub receiver: mpsc::UnboundedReceiver<PushFrame>,
}

/// Registry of open push channels, keyed by user.
///
/// One notification to a user is multiplexed to every channel that user has
/// open. The registry owns its own synchronization; callers share it behind
/// an `Arc`.
#[derive(Default)]
pub struct PushRegistry {
    channels: Mutex<HashMap<UserId, Vec<PushChannel>>>,
}

impl PushRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a shared registry handle.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, Vec<PushChannel>>> {
        self.channels.lock().expect("push registry lock poisoned")
    }

    /// Opens a new push channel for a user.
    ///
    /// The connection-acknowledgement frame is already queued on the
    /// returned receiver.
    pub fn connect(&self, user: &UserId) -> PushConnection {
        let id = Ulid::new();
        let (sender, receiver) = mpsc::unbounded_channel();
        let channel_id = format!("chan_{id}");

        // The receiver is still in hand, so this send cannot fail.
        let _ = sender.send(PushFrame::Connected {
            channel_id: channel_id.clone(),
        });

        self.lock()
            .entry(user.clone())
            .or_default()
            .push(PushChannel { id, sender });

        PushConnection {
            channel_id,
            receiver,
        }
    }

    /// Deregisters a channel after its connection closed.
    pub fn disconnect(&self, user: &UserId, channel_id: &str) {
        let mut channels = self.lock();
        if let Some(list) = channels.get_mut(user) {
            list.retain(|c| format!("chan_{}", c.id) != channel_id);
            if list.is_empty() {
                channels.remove(user);
            }
        }
    }

    /// Sends a frame to every channel a user has open.
    ///
    /// Channels whose receiver has gone away are pruned; delivery to the
    /// remaining channels is unaffected.
    pub fn send_to_user(&self, user: &UserId, frame: &PushFrame) {
        let mut channels = self.lock();
        if let Some(list) = channels.get_mut(user) {
            list.retain(|c| c.sender.send(frame.clone()).is_ok());
            if list.is_empty() {
                channels.remove(user);
            }
        }
    }

    /// Sends a frame to every open channel of every user.
    pub fn broadcast(&self, frame: &PushFrame) {
        let mut channels = self.lock();
        for list in channels.values_mut() {
            list.retain(|c| c.sender.send(frame.clone()).is_ok());
        }
        channels.retain(|_, list| !list.is_empty());
    }

    /// Emits a keep-alive frame on every open channel.
    ///
    /// The external transport owns the schedule; this is the hook it calls.
    pub fn keep_alive(&self) {
        self.broadcast(&PushFrame::KeepAlive);
    }

    /// Returns the number of open channels for a user.
    #[must_use]
    pub fn channel_count(&self, user: &UserId) -> usize {
        self.lock().get(user).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value as JsonValue;

    fn test_notification() -> Notification {
        Notification::new(
            Some(UserId::new("alice")),
            "task_assigned",
            "New task",
            "You have work",
            JsonValue::Null,
        )
    }

    #[tokio::test]
    async fn connect_queues_acknowledgement_first() {
        let registry = PushRegistry::new();
        let mut conn = registry.connect(&UserId::new("alice"));

        let first = conn.receiver.recv().await.unwrap();
        match first {
            PushFrame::Connected { channel_id } => assert_eq!(channel_id, conn.channel_id),
            other => panic!("expected Connected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn one_notification_reaches_every_open_channel() {
        let registry = PushRegistry::new();
        let user = UserId::new("alice");
        let mut conn_a = registry.connect(&user);
        let mut conn_b = registry.connect(&user);
        assert_eq!(registry.channel_count(&user), 2);

        let frame = PushFrame::Notification {
            notification: test_notification(),
        };
        registry.send_to_user(&user, &frame);

        // Skip the acknowledgement frames.
        conn_a.receiver.recv().await.unwrap();
        conn_b.receiver.recv().await.unwrap();

        assert_eq!(conn_a.receiver.recv().await.unwrap(), frame);
        assert_eq!(conn_b.receiver.recv().await.unwrap(), frame);
    }

    #[tokio::test]
    async fn dead_channel_is_pruned_without_affecting_others() {
        let registry = PushRegistry::new();
        let user = UserId::new("alice");
        let dead = registry.connect(&user);
        let mut live = registry.connect(&user);
        drop(dead.receiver);

        let frame = PushFrame::Notification {
            notification: test_notification(),
        };
        registry.send_to_user(&user, &frame);

        assert_eq!(registry.channel_count(&user), 1);
        live.receiver.recv().await.unwrap(); // ack
        assert_eq!(live.receiver.recv().await.unwrap(), frame);
    }

    #[tokio::test]
    async fn disconnect_deregisters_channel() {
        let registry = PushRegistry::new();
        let user = UserId::new("bob");
        let conn = registry.connect(&user);

        registry.disconnect(&user, &conn.channel_id);
        assert_eq!(registry.channel_count(&user), 0);
    }

    #[tokio::test]
    async fn broadcast_reaches_all_users() {
        let registry = PushRegistry::new();
        let mut alice = registry.connect(&UserId::new("alice"));
        let mut bob = registry.connect(&UserId::new("bob"));

        registry.keep_alive();

        alice.receiver.recv().await.unwrap(); // ack
        bob.receiver.recv().await.unwrap(); // ack
        assert_eq!(alice.receiver.recv().await.unwrap(), PushFrame::KeepAlive);
        assert_eq!(bob.receiver.recv().await.unwrap(), PushFrame::KeepAlive);
    }

    #[test]
    fn push_frame_wire_format() {
        let json = serde_json::to_value(PushFrame::KeepAlive).expect("serialize");
        assert_eq!(json["type"], "keep_alive");
    }
}
