//! Domain events emitted by the orchestration engine.
//!
//! Every state transition of interest publishes one of these events to the
//! durable pipe. Delivery is at-least-once; consumers must be idempotent and
//! must treat unknown event types as no-ops.

use caseflow_core::{DefinitionId, InstanceId, NotificationId, TaskId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A domain event published to the durable event pipe.
///
/// The serialized form carries a dotted `type` tag alongside the payload
/// fields, e.g. `{"type": "workflow.started", "instance_id": ..., ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    /// A new instance was created and began executing.
    #[serde(rename = "workflow.started")]
    WorkflowStarted {
        instance_id: InstanceId,
        definition_id: DefinitionId,
        started_by: UserId,
        timestamp: DateTime<Utc>,
    },
    /// The engine began executing a node.
    #[serde(rename = "workflow.node.started")]
    NodeStarted {
        instance_id: InstanceId,
        node_id: String,
        node_type: String,
        timestamp: DateTime<Utc>,
    },
    /// The engine advanced past a node.
    #[serde(rename = "workflow.node.completed")]
    NodeCompleted {
        instance_id: InstanceId,
        node_id: String,
        timestamp: DateTime<Utc>,
    },
    /// The instance reached an end node or exhausted the graph.
    #[serde(rename = "workflow.completed")]
    WorkflowCompleted {
        instance_id: InstanceId,
        timestamp: DateTime<Utc>,
    },
    /// The instance failed; the error text is recorded on the instance.
    #[serde(rename = "workflow.failed")]
    WorkflowFailed {
        instance_id: InstanceId,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// The instance was cancelled by a user.
    #[serde(rename = "workflow.cancelled")]
    WorkflowCancelled {
        instance_id: InstanceId,
        cancelled_by: Option<UserId>,
        timestamp: DateTime<Utc>,
    },
    /// A human task was created by a node.
    #[serde(rename = "task.created")]
    TaskCreated {
        instance_id: InstanceId,
        task_id: TaskId,
        node_id: Option<String>,
        assignee: Option<UserId>,
        timestamp: DateTime<Utc>,
    },
    /// A human task was completed.
    #[serde(rename = "task.completed")]
    TaskCompleted {
        instance_id: InstanceId,
        task_id: TaskId,
        completed_by: UserId,
        decision: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// A pending task was handed to a different assignee.
    #[serde(rename = "task.reassigned")]
    TaskReassigned {
        instance_id: InstanceId,
        task_id: TaskId,
        previous_assignee: Option<UserId>,
        new_assignee: UserId,
        timestamp: DateTime<Utc>,
    },
    /// A notification record was persisted.
    #[serde(rename = "notification.created")]
    NotificationCreated {
        notification_id: NotificationId,
        recipient: Option<UserId>,
        category: String,
        title: String,
        message: String,
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Returns the instance this event belongs to, if it is instance-scoped.
    ///
    /// Notification events may be system-wide and carry no instance.
    #[must_use]
    pub fn instance_id(&self) -> Option<InstanceId> {
        match self {
            Self::WorkflowStarted { instance_id, .. }
            | Self::NodeStarted { instance_id, .. }
            | Self::NodeCompleted { instance_id, .. }
            | Self::WorkflowCompleted { instance_id, .. }
            | Self::WorkflowFailed { instance_id, .. }
            | Self::WorkflowCancelled { instance_id, .. }
            | Self::TaskCreated { instance_id, .. }
            | Self::TaskCompleted { instance_id, .. }
            | Self::TaskReassigned { instance_id, .. } => Some(*instance_id),
            Self::NotificationCreated { .. } => None,
        }
    }

    /// Returns the timestamp of this event.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::WorkflowStarted { timestamp, .. }
            | Self::NodeStarted { timestamp, .. }
            | Self::NodeCompleted { timestamp, .. }
            | Self::WorkflowCompleted { timestamp, .. }
            | Self::WorkflowFailed { timestamp, .. }
            | Self::WorkflowCancelled { timestamp, .. }
            | Self::TaskCreated { timestamp, .. }
            | Self::TaskCompleted { timestamp, .. }
            | Self::TaskReassigned { timestamp, .. }
            | Self::NotificationCreated { timestamp, .. } => *timestamp,
        }
    }

    /// Returns the dotted event type tag as it appears on the wire.
    #[must_use]
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::WorkflowStarted { .. } => "workflow.started",
            Self::NodeStarted { .. } => "workflow.node.started",
            Self::NodeCompleted { .. } => "workflow.node.completed",
            Self::WorkflowCompleted { .. } => "workflow.completed",
            Self::WorkflowFailed { .. } => "workflow.failed",
            Self::WorkflowCancelled { .. } => "workflow.cancelled",
            Self::TaskCreated { .. } => "task.created",
            Self::TaskCompleted { .. } => "task.completed",
            Self::TaskReassigned { .. } => "task.reassigned",
            Self::NotificationCreated { .. } => "notification.created",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_wire_tag_is_dotted() {
        let event = DomainEvent::WorkflowStarted {
            instance_id: InstanceId::new(),
            definition_id: DefinitionId::new(),
            started_by: UserId::new("alice"),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "workflow.started");
        assert_eq!(event.type_tag(), "workflow.started");
    }

    #[test]
    fn event_serde_roundtrip() {
        let event = DomainEvent::TaskCompleted {
            instance_id: InstanceId::new(),
            task_id: TaskId::new(),
            completed_by: UserId::new("bob"),
            decision: Some("approved".to_string()),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&event).expect("serialize");
        let parsed: DomainEvent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(event.instance_id(), parsed.instance_id());
        assert_eq!(parsed.type_tag(), "task.completed");
    }

    #[test]
    fn notification_event_has_no_instance() {
        let event = DomainEvent::NotificationCreated {
            notification_id: NotificationId::new(),
            recipient: None,
            category: "system".to_string(),
            title: "Maintenance".to_string(),
            message: "Scheduled downtime".to_string(),
            data: serde_json::Value::Null,
            timestamp: Utc::now(),
        };

        assert!(event.instance_id().is_none());
    }
}
