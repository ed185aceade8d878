//! The append-only execution history log.
//!
//! Every transition appends an entry; entries are never updated or deleted.
//! This log, not the event pipe, is the authoritative audit trail.

use caseflow_core::{HistoryEntryId, InstanceId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    WorkflowStarted,
    NodeStarted,
    NodeCompleted,
    TaskCreated,
    TaskCompleted,
    TaskReassigned,
    TaskStatusSet,
    TimerScheduled,
    WorkflowCompleted,
    WorkflowFailed,
    WorkflowCancelled,
}

/// A single history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unique identifier.
    pub id: HistoryEntryId,
    /// The instance this entry belongs to.
    pub instance_id: InstanceId,
    /// The node or step label, when the action concerns one.
    pub step: Option<String>,
    /// What happened.
    pub action: HistoryAction,
    /// Acting user; `None` for engine-driven transitions.
    pub user: Option<UserId>,
    /// Contextual data.
    pub data: JsonValue,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    /// Creates a new entry timestamped now.
    #[must_use]
    pub fn new(instance_id: InstanceId, action: HistoryAction) -> Self {
        Self {
            id: HistoryEntryId::new(),
            instance_id,
            step: None,
            action,
            user: None,
            data: JsonValue::Null,
            timestamp: Utc::now(),
        }
    }

    /// Sets the step label.
    #[must_use]
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    /// Sets the acting user.
    #[must_use]
    pub fn with_user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }

    /// Sets the contextual data.
    #[must_use]
    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = data;
        self
    }
}
