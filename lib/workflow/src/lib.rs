//! Workflow definitions and the execution engine for caseflow.
//!
//! This crate provides the core of the orchestration platform:
//!
//! - **Definition Model**: graphs of typed nodes parsed from the wire format
//! - **Graph**: petgraph-backed structure with ordered, label-aware routing
//! - **Conditions**: pure predicate evaluation over instance data
//! - **Engine**: the per-instance-serialized graph interpreter
//! - **Lifecycle**: task listing, completion, reassignment, statistics
//! - **Timers**: durable due-at records with an idempotent resume sweep

pub mod assignee;
pub mod condition;
pub mod config;
pub mod definition;
pub mod edge;
pub mod engine;
pub mod error;
pub mod graph;
pub mod history;
pub mod instance;
pub mod lifecycle;
pub mod node;
pub mod store;
pub mod timer;

pub use assignee::normalize_assignees;
pub use condition::{Condition, ConditionOperator};
pub use config::EngineConfig;
pub use definition::{AccessControl, DefinitionMetadata, DefinitionSummary, WorkflowDefinition};
pub use edge::Edge;
pub use engine::{Engine, EngineServices};
pub use error::{EngineError, GraphError, StoreError};
pub use graph::WorkflowGraph;
pub use history::{HistoryAction, HistoryEntry};
pub use instance::{InstanceStatus, WorkflowInstance};
pub use lifecycle::{TaskLifecycle, TaskStats};
pub use node::{
    ApprovalConfig, ApprovalMode, ConditionConfig, HumanTaskConfig, Node, NodeId, NodeKind,
    NotifyChannel, NotifyNodeConfig, TimerConfig, VariableConfig,
};
pub use store::{
    DefinitionStore, HistoryStore, InMemoryDefinitionStore, InMemoryHistoryStore,
    InMemoryInstanceStore, InstanceStore,
};
pub use timer::{InMemoryTimerStore, TimerRecord, TimerStore};
