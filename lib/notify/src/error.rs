//! Error types for the notify crate.

use caseflow_core::NotificationId;
use std::fmt;

/// Errors from notification and subscription operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// Notification not found.
    NotFound { id: NotificationId },
    /// Storage operation failed.
    StorageFailed { reason: String },
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { id } => write!(f, "notification not found: {id}"),
            Self::StorageFailed { reason } => {
                write!(f, "notification storage failed: {reason}")
            }
        }
    }
}

impl std::error::Error for NotifyError {}
