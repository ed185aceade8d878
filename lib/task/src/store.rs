//! Task storage trait and in-memory implementation.

use crate::error::TaskError;
use crate::task::{Task, TaskKind, TaskStatus};
use async_trait::async_trait;
use caseflow_core::{InstanceId, TaskId, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Filter for task listings.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Restrict to one status.
    pub status: Option<TaskStatus>,
    /// Restrict to one kind.
    pub kind: Option<TaskKind>,
    /// Restrict to tasks assigned to this user (as assignee or co-assignee).
    pub assignee: Option<UserId>,
    /// Restrict to one instance.
    pub instance_id: Option<InstanceId>,
    /// Page size; `None` returns everything.
    pub limit: Option<usize>,
    /// Rows to skip before the first returned row.
    pub offset: usize,
}

impl TaskFilter {
    /// Returns true if the task matches every set criterion.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(status) = self.status
            && task.status != status
        {
            return false;
        }
        if let Some(kind) = self.kind
            && task.kind != kind
        {
            return false;
        }
        if let Some(assignee) = &self.assignee
            && !task.is_assigned_to(assignee)
        {
            return false;
        }
        if let Some(instance_id) = self.instance_id
            && task.instance_id != instance_id
        {
            return false;
        }
        true
    }
}

/// Trait for task persistence.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persists a new task.
    async fn create(&self, task: &Task) -> Result<(), TaskError>;

    /// Returns a task by ID.
    async fn get(&self, id: TaskId) -> Result<Option<Task>, TaskError>;

    /// Replaces a task's stored state.
    async fn update(&self, task: &Task) -> Result<(), TaskError>;

    /// Lists tasks matching the filter, newest first, with pagination.
    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, TaskError>;

    /// Returns non-terminal tasks created by a node within an instance.
    async fn open_for_node(
        &self,
        instance_id: InstanceId,
        node_id: &str,
    ) -> Result<Vec<Task>, TaskError>;

    /// Returns tasks currently holding a form lease.
    async fn list_locked(&self) -> Result<Vec<Task>, TaskError>;
}

/// In-memory task store for tests and local development.
#[derive(Clone, Default)]
pub struct InMemoryTaskStore {
    rows: Arc<Mutex<HashMap<TaskId, Task>>>,
}

impl InMemoryTaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TaskId, Task>> {
        self.rows.lock().expect("task store lock poisoned")
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, task: &Task) -> Result<(), TaskError> {
        self.lock().insert(task.id, task.clone());
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>, TaskError> {
        Ok(self.lock().get(&id).cloned())
    }

    async fn update(&self, task: &Task) -> Result<(), TaskError> {
        let mut rows = self.lock();
        if !rows.contains_key(&task.id) {
            return Err(TaskError::NotFound { id: task.id });
        }
        rows.insert(task.id, task.clone());
        Ok(())
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, TaskError> {
        let mut rows: Vec<Task> = self
            .lock()
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let rows = rows.into_iter().skip(filter.offset);
        Ok(match filter.limit {
            Some(limit) => rows.take(limit).collect(),
            None => rows.collect(),
        })
    }

    async fn open_for_node(
        &self,
        instance_id: InstanceId,
        node_id: &str,
    ) -> Result<Vec<Task>, TaskError> {
        Ok(self
            .lock()
            .values()
            .filter(|t| {
                t.instance_id == instance_id
                    && t.node_id.as_deref() == Some(node_id)
                    && !t.status.is_terminal()
            })
            .cloned()
            .collect())
    }

    async fn list_locked(&self) -> Result<Vec<Task>, TaskError> {
        Ok(self
            .lock()
            .values()
            .filter(|t| t.lock_owner.is_some())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_for(instance: InstanceId, assignee: &str, status: TaskStatus) -> Task {
        let mut task = Task::new(
            instance,
            TaskKind::Task,
            "Review request",
            Some(UserId::new(assignee)),
        );
        task.status = status;
        task
    }

    #[tokio::test]
    async fn filter_by_assignee_covers_co_assignees() {
        let store = InMemoryTaskStore::new();
        let instance = InstanceId::new();
        let mut task = task_for(instance, "alice", TaskStatus::Pending);
        task.co_assignees.push(UserId::new("bob"));
        store.create(&task).await.unwrap();

        let filter = TaskFilter {
            assignee: Some(UserId::new("bob")),
            ..TaskFilter::default()
        };
        assert_eq!(store.list(&filter).await.unwrap().len(), 1);

        let filter = TaskFilter {
            assignee: Some(UserId::new("mallory")),
            ..TaskFilter::default()
        };
        assert!(store.list(&filter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_paginates() {
        let store = InMemoryTaskStore::new();
        let instance = InstanceId::new();
        for _ in 0..5 {
            store
                .create(&task_for(instance, "alice", TaskStatus::Pending))
                .await
                .unwrap();
        }

        let filter = TaskFilter {
            limit: Some(2),
            offset: 4,
            ..TaskFilter::default()
        };
        assert_eq!(store.list(&filter).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn open_for_node_excludes_terminal_tasks() {
        let store = InMemoryTaskStore::new();
        let instance = InstanceId::new();

        let mut open = task_for(instance, "alice", TaskStatus::Pending);
        open.node_id = Some("node_1".to_string());
        store.create(&open).await.unwrap();

        let mut done = task_for(instance, "bob", TaskStatus::Completed);
        done.node_id = Some("node_1".to_string());
        store.create(&done).await.unwrap();

        let remaining = store.open_for_node(instance, "node_1").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, open.id);
    }

    #[tokio::test]
    async fn update_missing_task_is_not_found() {
        let store = InMemoryTaskStore::new();
        let task = task_for(InstanceId::new(), "alice", TaskStatus::Pending);
        let result = store.update(&task).await;
        assert!(matches!(result, Err(TaskError::NotFound { .. })));
    }
}
