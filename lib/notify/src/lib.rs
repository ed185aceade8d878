//! Notification persistence and live push fan-out for caseflow.
//!
//! This crate provides:
//!
//! - **Notification**: durable per-user (or broadcast) records with read state
//! - **Subscriptions**: (user, instance) pairs driving progress fan-out
//! - **Push Registry**: per-user multiplexed live channels with keep-alive
//! - **Notifier**: persist → publish → push, best-effort on delivery

pub mod error;
pub mod notification;
pub mod notifier;
pub mod push;
pub mod store;
pub mod subscription;

pub use error::NotifyError;
pub use notification::Notification;
pub use notifier::Notifier;
pub use push::{PushConnection, PushFrame, PushRegistry};
pub use store::{InMemoryNotificationStore, NotificationStore};
pub use subscription::{InMemorySubscriptionStore, Subscription, SubscriptionStore};
