//! Error types for the workflow crate.
//!
//! - `GraphError`: structural problems in a workflow graph
//! - `StoreError`: failures from the persistence layer
//! - `EngineError`: execution failures; routing errors are fatal to the
//!   instance, permission and state errors are returned to the caller

use crate::node::NodeId;
use caseflow_core::{DefinitionId, InstanceId, TaskId};
use caseflow_notify::NotifyError;
use caseflow_task::TaskError;
use std::fmt;

/// Errors from graph operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Node with the given ID was not found in the graph.
    NodeNotFound { node_id: NodeId },
    /// A node ID appears more than once.
    DuplicateNodeId { node_id: NodeId },
    /// The graph has no start node.
    NoStartNode,
    /// The graph has more than one start node.
    MultipleStartNodes,
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeNotFound { node_id } => write!(f, "node not found: {node_id}"),
            Self::DuplicateNodeId { node_id } => {
                write!(f, "duplicate node id: {node_id}")
            }
            Self::NoStartNode => write!(f, "graph has no start node"),
            Self::MultipleStartNodes => write!(f, "graph has more than one start node"),
        }
    }
}

impl std::error::Error for GraphError {}

/// Errors from the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not serve the request.
    Unavailable { reason: String },
    /// A stored row could not be decoded.
    Decode { reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "store unavailable: {reason}"),
            Self::Decode { reason } => write!(f, "stored row could not be decoded: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from engine and lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Definition does not exist.
    DefinitionNotFound { id: DefinitionId },
    /// Definition exists but is disabled.
    DefinitionInactive { id: DefinitionId },
    /// Instance does not exist.
    InstanceNotFound { id: InstanceId },
    /// Task does not exist.
    TaskNotFound { id: TaskId },
    /// Operation not valid for the current status.
    InvalidState { reason: String },
    /// Caller is not allowed to perform the operation.
    Forbidden { reason: String },
    /// No outgoing edge matched during conditional routing. Fatal to the
    /// instance.
    Routing { node_id: NodeId, label: String },
    /// Malformed definition or node configuration.
    Validation { reason: String },
    /// Persistence failure.
    Store(StoreError),
    /// Task-layer failure.
    Task(TaskError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DefinitionNotFound { id } => write!(f, "definition not found: {id}"),
            Self::DefinitionInactive { id } => write!(f, "definition is inactive: {id}"),
            Self::InstanceNotFound { id } => write!(f, "instance not found: {id}"),
            Self::TaskNotFound { id } => write!(f, "task not found: {id}"),
            Self::InvalidState { reason } => write!(f, "invalid state: {reason}"),
            Self::Forbidden { reason } => write!(f, "forbidden: {reason}"),
            Self::Routing { node_id, label } => {
                write!(f, "no outgoing edge labeled '{label}' from node {node_id}")
            }
            Self::Validation { reason } => write!(f, "validation failed: {reason}"),
            Self::Store(e) => write!(f, "store error: {e}"),
            Self::Task(e) => write!(f, "task error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<TaskError> for EngineError {
    fn from(e: TaskError) -> Self {
        match e {
            TaskError::NotFound { id } => Self::TaskNotFound { id },
            other => Self::Task(other),
        }
    }
}

impl From<NotifyError> for EngineError {
    fn from(e: NotifyError) -> Self {
        Self::Store(StoreError::Unavailable {
            reason: e.to_string(),
        })
    }
}
