//! Task model.
//!
//! A task is a unit of human work bound to exactly one instance and, when
//! created by the engine, one originating node. Tasks are mutated by
//! assignees through the form lock service and by the lifecycle component;
//! a task never outlives its instance.

use crate::schema::FormSchema;
use caseflow_core::{InstanceId, TaskId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// The kind of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// A form to fill in.
    Form,
    /// A plain unit of work.
    Task,
    /// A step in a multi-party approval.
    Approval,
}

impl TaskKind {
    /// Returns the lowercase string form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Form => "form",
            Self::Task => "task",
            Self::Approval => "approval",
        }
    }
}

/// The lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for an assignee to pick it up.
    Pending,
    /// An assignee has started working on it.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished with a rejecting decision.
    Rejected,
    /// Cancelled, usually because the instance was cancelled.
    Cancelled,
}

impl TaskStatus {
    /// Returns true if this is a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Cancelled)
    }

    /// Returns true if a completion may be recorded from this status.
    #[must_use]
    pub fn is_completable(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }

    /// Returns the lowercase string form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// The decision recorded on an approval task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskDecision {
    Approved,
    Rejected,
}

impl TaskDecision {
    /// Returns true for a rejecting decision.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected)
    }

    /// Returns the lowercase string form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// A unit of human work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier.
    pub id: TaskId,
    /// The instance this task belongs to.
    pub instance_id: InstanceId,
    /// The graph node that created the task, if any.
    pub node_id: Option<String>,
    /// What kind of work this is.
    pub kind: TaskKind,
    /// Human-readable title (usually the node label).
    pub title: String,
    /// Primary assignee.
    pub assignee: Option<UserId>,
    /// Additional assignees who may also work the task.
    pub co_assignees: Vec<UserId>,
    /// Current status.
    pub status: TaskStatus,
    /// Priority.
    pub priority: TaskPriority,
    /// When the work is due, if a deadline was set.
    pub due_at: Option<DateTime<Utc>>,
    /// Node-specific context (instructions, approver cursor, ...).
    pub data: JsonValue,
    /// Recorded approval decision.
    pub decision: Option<TaskDecision>,
    /// Current form-lease owner.
    pub lock_owner: Option<UserId>,
    /// When the current lease was acquired.
    pub locked_at: Option<DateTime<Utc>>,
    /// Schema restricting which fields each user may edit.
    pub form_schema: Option<FormSchema>,
    /// Latest saved form field values.
    pub form_data: Map<String, JsonValue>,
    /// Form completion percentage, 0–100.
    pub form_progress: u8,
    /// Who submitted the finished form.
    pub submitted_by: Option<UserId>,
    /// The user who started the owning instance.
    pub originator: Option<UserId>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Creates a new pending task.
    #[must_use]
    pub fn new(
        instance_id: InstanceId,
        kind: TaskKind,
        title: impl Into<String>,
        assignee: Option<UserId>,
    ) -> Self {
        Self {
            id: TaskId::new(),
            instance_id,
            node_id: None,
            kind,
            title: title.into(),
            assignee,
            co_assignees: Vec::new(),
            status: TaskStatus::Pending,
            priority: TaskPriority::default(),
            due_at: None,
            data: JsonValue::Null,
            decision: None,
            lock_owner: None,
            locked_at: None,
            form_schema: None,
            form_data: Map::new(),
            form_progress: 0,
            submitted_by: None,
            originator: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Returns every user assigned to this task.
    #[must_use]
    pub fn assignees(&self) -> Vec<&UserId> {
        self.assignee
            .iter()
            .chain(self.co_assignees.iter())
            .collect()
    }

    /// Returns true if the user is the assignee or a co-assignee.
    #[must_use]
    pub fn is_assigned_to(&self, user: &UserId) -> bool {
        self.assignee.as_ref() == Some(user) || self.co_assignees.contains(user)
    }

    /// Returns true if the lease is held and older than `lease` allows.
    #[must_use]
    pub fn lease_expired(&self, lease: chrono::Duration, now: DateTime<Utc>) -> bool {
        match (self.lock_owner.as_ref(), self.locked_at) {
            (Some(_), Some(acquired)) => now - acquired > lease,
            _ => false,
        }
    }

    /// Grants the form lease to a user.
    pub fn grant_lease(&mut self, user: &UserId) {
        self.lock_owner = Some(user.clone());
        self.locked_at = Some(Utc::now());
    }

    /// Clears the form lease.
    pub fn clear_lease(&mut self) {
        self.lock_owner = None;
        self.locked_at = None;
    }

    /// Records a completion.
    pub fn complete(&mut self, decision: Option<TaskDecision>) {
        self.status = TaskStatus::Completed;
        self.decision = decision;
        self.completed_at = Some(Utc::now());
    }

    /// Cancels the task.
    pub fn cancel(&mut self) {
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }

    /// Returns true if the task is overdue: still pending past its due date.
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Pending && self.due_at.is_some_and(|due| due < now)
    }
}
