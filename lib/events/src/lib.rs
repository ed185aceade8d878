//! Domain events and durable publication for the caseflow platform.
//!
//! This crate provides:
//!
//! - **Domain Events**: the closed set of events emitted on state transitions
//! - **Envelope**: versioned wrapper for every serialized payload
//! - **Publisher**: at-least-once publication trait with NATS JetStream and
//!   in-memory implementations

pub mod envelope;
pub mod event;
pub mod nats;
pub mod publisher;

pub use envelope::Envelope;
pub use event::DomainEvent;
pub use nats::{NatsConfig, NatsEventPublisher};
pub use publisher::{EventPublisher, InMemoryEventPublisher, PublishError};
