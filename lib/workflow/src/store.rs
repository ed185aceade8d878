//! Storage traits for definitions, instances, and history, with in-memory
//! implementations for tests and local development.
//!
//! The relational store itself is an external collaborator; these traits are
//! the CRUD surface the engine consumes from it.

use crate::definition::{DefinitionSummary, WorkflowDefinition};
use crate::error::StoreError;
use crate::history::HistoryEntry;
use crate::instance::WorkflowInstance;
use async_trait::async_trait;
use caseflow_core::{DefinitionId, InstanceId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Trait for definition persistence.
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    /// Persists a definition.
    async fn create(&self, definition: &WorkflowDefinition) -> Result<(), StoreError>;

    /// Returns a definition by ID.
    async fn get(&self, id: DefinitionId) -> Result<Option<WorkflowDefinition>, StoreError>;

    /// Replaces a definition's stored state (metadata changes only;
    /// published graphs are immutable by convention).
    async fn update(&self, definition: &WorkflowDefinition) -> Result<(), StoreError>;

    /// Lists definition summaries, most recently updated first.
    async fn list_summaries(&self) -> Result<Vec<DefinitionSummary>, StoreError>;
}

/// Trait for instance persistence.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Persists a new instance.
    async fn create(&self, instance: &WorkflowInstance) -> Result<(), StoreError>;

    /// Returns an instance by ID.
    async fn get(&self, id: InstanceId) -> Result<Option<WorkflowInstance>, StoreError>;

    /// Replaces an instance's stored state.
    async fn update(&self, instance: &WorkflowInstance) -> Result<(), StoreError>;

    /// Lists non-terminal instances, oldest first.
    async fn list_active(&self) -> Result<Vec<WorkflowInstance>, StoreError>;
}

/// Trait for the append-only history log.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends an entry. Entries are never updated or deleted.
    async fn append(&self, entry: &HistoryEntry) -> Result<(), StoreError>;

    /// Returns an instance's entries in time order.
    async fn list_for_instance(&self, id: InstanceId) -> Result<Vec<HistoryEntry>, StoreError>;
}

/// In-memory definition store.
#[derive(Clone, Default)]
pub struct InMemoryDefinitionStore {
    rows: Arc<Mutex<HashMap<DefinitionId, WorkflowDefinition>>>,
}

impl InMemoryDefinitionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DefinitionStore for InMemoryDefinitionStore {
    async fn create(&self, definition: &WorkflowDefinition) -> Result<(), StoreError> {
        self.rows
            .lock()
            .expect("definition store lock poisoned")
            .insert(definition.id, definition.clone());
        Ok(())
    }

    async fn get(&self, id: DefinitionId) -> Result<Option<WorkflowDefinition>, StoreError> {
        Ok(self
            .rows
            .lock()
            .expect("definition store lock poisoned")
            .get(&id)
            .cloned())
    }

    async fn update(&self, definition: &WorkflowDefinition) -> Result<(), StoreError> {
        self.rows
            .lock()
            .expect("definition store lock poisoned")
            .insert(definition.id, definition.clone());
        Ok(())
    }

    async fn list_summaries(&self) -> Result<Vec<DefinitionSummary>, StoreError> {
        let mut summaries: Vec<DefinitionSummary> = self
            .rows
            .lock()
            .expect("definition store lock poisoned")
            .values()
            .map(DefinitionSummary::from)
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}

/// In-memory instance store.
#[derive(Clone, Default)]
pub struct InMemoryInstanceStore {
    rows: Arc<Mutex<HashMap<InstanceId, WorkflowInstance>>>,
}

impl InMemoryInstanceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InstanceStore for InMemoryInstanceStore {
    async fn create(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        self.rows
            .lock()
            .expect("instance store lock poisoned")
            .insert(instance.id, instance.clone());
        Ok(())
    }

    async fn get(&self, id: InstanceId) -> Result<Option<WorkflowInstance>, StoreError> {
        Ok(self
            .rows
            .lock()
            .expect("instance store lock poisoned")
            .get(&id)
            .cloned())
    }

    async fn update(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().expect("instance store lock poisoned");
        if !rows.contains_key(&instance.id) {
            return Err(StoreError::Unavailable {
                reason: format!("instance {} does not exist", instance.id),
            });
        }
        rows.insert(instance.id, instance.clone());
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<WorkflowInstance>, StoreError> {
        let mut active: Vec<WorkflowInstance> = self
            .rows
            .lock()
            .expect("instance store lock poisoned")
            .values()
            .filter(|i| !i.is_terminal())
            .cloned()
            .collect();
        active.sort_by_key(|i| i.started_at);
        Ok(active)
    }
}

/// In-memory history store.
#[derive(Clone, Default)]
pub struct InMemoryHistoryStore {
    entries: Arc<Mutex<Vec<HistoryEntry>>>,
}

impl InMemoryHistoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, entry: &HistoryEntry) -> Result<(), StoreError> {
        self.entries
            .lock()
            .expect("history store lock poisoned")
            .push(entry.clone());
        Ok(())
    }

    async fn list_for_instance(&self, id: InstanceId) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(self
            .entries
            .lock()
            .expect("history store lock poisoned")
            .iter()
            .filter(|e| e.instance_id == id)
            .cloned()
            .collect())
    }
}
