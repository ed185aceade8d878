//! Task model, storage, and the form lock/draft service for caseflow.
//!
//! This crate provides:
//!
//! - **Task**: the unit of human work generated by workflow nodes
//! - **Task Store**: filterable persistence trait with an in-memory double
//! - **Form Schema**: field-level edit authorization
//! - **Form Lock Service**: lease-based mutual exclusion, drafts, submission

pub mod error;
pub mod lock;
pub mod schema;
pub mod store;
pub mod task;

pub use error::TaskError;
pub use lock::{DEFAULT_LEASE_MINUTES, EditPermission, FormLockService};
pub use schema::{FormField, FormSchema};
pub use store::{InMemoryTaskStore, TaskFilter, TaskStore};
pub use task::{Task, TaskDecision, TaskKind, TaskPriority, TaskStatus};
