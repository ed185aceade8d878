//! Workflow instance state.
//!
//! An instance is one execution of a definition: a pointer into the graph, a
//! mutable data bag for condition evaluation and cross-node variable
//! passing, and a status that becomes terminal exactly once. Only the engine
//! and the task-completion callbacks mutate an instance.

use crate::node::NodeId;
use caseflow_core::{DefinitionId, InstanceId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// The lifecycle status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Created but not yet picked up. Present for wire compatibility; the
    /// engine starts instances directly in `Running`.
    Pending,
    /// Actively executing or suspended on human work.
    Running,
    /// Reached an end node or exhausted the graph.
    Completed,
    /// Failed; the error text is recorded.
    Failed,
    /// Cancelled by a user.
    Cancelled,
}

impl InstanceStatus {
    /// Returns true if this is a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns the lowercase string form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One execution of a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// Unique identifier.
    pub id: InstanceId,
    /// The definition being executed.
    pub definition_id: DefinitionId,
    /// Current status.
    pub status: InstanceStatus,
    /// The node the execution pointer rests on.
    pub current_node: Option<NodeId>,
    /// Mutable key-value bag for conditions and variable passing.
    pub data: Map<String, JsonValue>,
    /// Who started the instance.
    pub started_by: UserId,
    /// When the instance was started.
    pub started_at: DateTime<Utc>,
    /// When the instance reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Error text, if the instance failed.
    pub error: Option<String>,
}

impl WorkflowInstance {
    /// Creates a running instance positioned at the start node.
    #[must_use]
    pub fn new(
        definition_id: DefinitionId,
        start_node: NodeId,
        data: Map<String, JsonValue>,
        started_by: UserId,
    ) -> Self {
        Self {
            id: InstanceId::new(),
            definition_id,
            status: InstanceStatus::Running,
            current_node: Some(start_node),
            data,
            started_by,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    /// Returns true if the instance is in a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves the execution pointer.
    pub fn advance_to(&mut self, node: NodeId) {
        self.current_node = Some(node);
    }

    /// Merges values into the data bag; later keys replace earlier ones.
    pub fn merge_data(&mut self, values: Map<String, JsonValue>) {
        for (key, value) in values {
            self.data.insert(key, value);
        }
    }

    /// Stores one value in the data bag.
    pub fn set_data(&mut self, key: impl Into<String>, value: JsonValue) {
        self.data.insert(key.into(), value);
    }

    /// Marks the instance as completed.
    pub fn complete(&mut self) {
        self.status = InstanceStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Marks the instance as failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = InstanceStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
    }

    /// Marks the instance as cancelled.
    pub fn cancel(&mut self) {
        self.status = InstanceStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }

    /// Returns how long the instance has been (or was) running.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        end - self.started_at
    }
}
