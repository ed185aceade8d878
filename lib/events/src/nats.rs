//! NATS JetStream implementation of the event publisher.
//!
//! Events land on a file-backed JetStream stream with one subject per
//! instance, so ordering within an instance follows subject ordering and a
//! downstream processor can replay a single instance's history. Events with
//! no instance scope (system-wide notifications) share a dedicated subject.

use crate::envelope::Envelope;
use crate::event::DomainEvent;
use crate::publisher::{EventPublisher, PublishError};
use async_nats::jetstream;
use async_trait::async_trait;
use caseflow_core::InstanceId;
use std::sync::Arc;

/// Subject prefix for instance-scoped events.
const INSTANCE_SUBJECT_PREFIX: &str = "caseflow.instance";

/// Subject for events without an instance scope.
const SYSTEM_SUBJECT: &str = "caseflow.system";

/// Stream name for domain events.
const EVENTS_STREAM_NAME: &str = "CASEFLOW_EVENTS";

/// Configuration for the NATS event publisher.
#[derive(Debug, Clone)]
pub struct NatsConfig {
    /// NATS server URL.
    pub url: String,
    /// Stream name for events (defaults to CASEFLOW_EVENTS).
    pub stream_name: Option<String>,
}

impl NatsConfig {
    /// Creates a new config with the given NATS URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stream_name: None,
        }
    }

    fn stream(&self) -> &str {
        self.stream_name.as_deref().unwrap_or(EVENTS_STREAM_NAME)
    }
}

/// NATS JetStream-backed event publisher.
pub struct NatsEventPublisher {
    jetstream: Arc<jetstream::Context>,
}

impl NatsEventPublisher {
    /// Creates a new NATS event publisher.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or stream setup fails.
    pub async fn new(config: NatsConfig) -> Result<Self, PublishError> {
        let client = async_nats::connect(&config.url).await.map_err(|e| {
            PublishError::ConnectionFailed {
                message: e.to_string(),
            }
        })?;

        let jetstream = async_nats::jetstream::new(client);

        let stream_config = jetstream::stream::Config {
            name: config.stream().to_string(),
            subjects: vec![format!("{INSTANCE_SUBJECT_PREFIX}.>"), SYSTEM_SUBJECT.to_string()],
            storage: jetstream::stream::StorageType::File,
            retention: jetstream::stream::RetentionPolicy::Limits,
            ..Default::default()
        };

        jetstream
            .get_or_create_stream(stream_config)
            .await
            .map_err(|e| PublishError::ConnectionFailed {
                message: format!("failed to create events stream: {e}"),
            })?;

        Ok(Self {
            jetstream: Arc::new(jetstream),
        })
    }

    /// Returns the subject an event is published on.
    fn subject_for(instance_id: Option<InstanceId>) -> String {
        match instance_id {
            Some(id) => format!("{INSTANCE_SUBJECT_PREFIX}.{id}"),
            None => SYSTEM_SUBJECT.to_string(),
        }
    }
}

#[async_trait]
impl EventPublisher for NatsEventPublisher {
    async fn publish(&self, event: Envelope<DomainEvent>) -> Result<(), PublishError> {
        let subject = Self::subject_for(event.payload.instance_id());
        let bytes = event
            .to_json_bytes()
            .map_err(|e| PublishError::PublishFailed {
                message: format!("failed to serialize event: {e}"),
            })?;

        // The double await confirms the JetStream ack, not just the send.
        self.jetstream
            .publish(subject, bytes.into())
            .await
            .map_err(|e| PublishError::PublishFailed {
                message: e.to_string(),
            })?
            .await
            .map_err(|e| PublishError::PublishFailed {
                message: e.to_string(),
            })?;

        Ok(())
    }
}
