//! Event publication trait and in-memory implementation.
//!
//! The publisher abstraction keeps the engine testable without a broker
//! while supporting the real NATS implementation in production. Publication
//! is at-least-once: a publisher may deliver an event more than once, never
//! zero times once `publish` has returned `Ok`.

use crate::envelope::Envelope;
use crate::event::DomainEvent;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Trait for durable, at-least-once event publication.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes an event to the durable pipe.
    async fn publish(&self, event: Envelope<DomainEvent>) -> Result<(), PublishError>;
}

/// Errors from event publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// Failed to connect to the broker.
    ConnectionFailed { message: String },
    /// Failed to publish the event.
    PublishFailed { message: String },
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionFailed { message } => {
                write!(f, "event pipe connection failed: {message}")
            }
            Self::PublishFailed { message } => write!(f, "event publish failed: {message}"),
        }
    }
}

impl std::error::Error for PublishError {}

/// In-memory event publisher for tests and local development.
///
/// Records every published event in order. Clones share the same buffer, so
/// a test can keep one handle while handing another to the engine.
#[derive(Clone, Default)]
pub struct InMemoryEventPublisher {
    events: Arc<Mutex<Vec<Envelope<DomainEvent>>>>,
}

impl InMemoryEventPublisher {
    /// Creates an empty publisher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the payloads of every event published so far.
    #[must_use]
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events
            .lock()
            .expect("publisher lock poisoned")
            .iter()
            .map(|e| e.payload.clone())
            .collect()
    }

    /// Returns the wire type tags of every event published so far.
    #[must_use]
    pub fn type_tags(&self) -> Vec<&'static str> {
        self.events()
            .iter()
            .map(DomainEvent::type_tag)
            .collect()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventPublisher {
    async fn publish(&self, event: Envelope<DomainEvent>) -> Result<(), PublishError> {
        self.events
            .lock()
            .expect("publisher lock poisoned")
            .push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caseflow_core::InstanceId;
    use chrono::Utc;

    #[tokio::test]
    async fn in_memory_publisher_records_events() {
        let publisher = InMemoryEventPublisher::new();
        let handle = publisher.clone();

        let event = DomainEvent::WorkflowCompleted {
            instance_id: InstanceId::new(),
            timestamp: Utc::now(),
        };
        publisher.publish(Envelope::new(event)).await.unwrap();

        assert_eq!(handle.type_tags(), vec!["workflow.completed"]);
    }

    #[test]
    fn publish_error_display() {
        let err = PublishError::PublishFailed {
            message: "broker unavailable".to_string(),
        };
        assert!(err.to_string().contains("event publish failed"));
    }
}
