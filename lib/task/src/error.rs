//! Error types for the task crate.

use caseflow_core::{TaskId, UserId};
use std::fmt;

/// Errors from task operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Task not found.
    NotFound { id: TaskId },
    /// Operation not valid for the task's current status.
    InvalidState { id: TaskId, status: String },
    /// Caller is not allowed to perform the operation.
    Forbidden { reason: String },
    /// Another user holds a live form lease.
    LockConflict { id: TaskId, owner: UserId },
    /// Storage operation failed.
    StorageFailed { reason: String },
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { id } => write!(f, "task not found: {id}"),
            Self::InvalidState { id, status } => {
                write!(f, "task {id} is in status '{status}'")
            }
            Self::Forbidden { reason } => write!(f, "forbidden: {reason}"),
            Self::LockConflict { id, owner } => {
                write!(f, "task {id} is locked by {owner}")
            }
            Self::StorageFailed { reason } => write!(f, "task storage failed: {reason}"),
        }
    }
}

impl std::error::Error for TaskError {}
