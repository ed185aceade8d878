//! Task lifecycle operations.
//!
//! Listing, completion, reassignment, administrative overrides, and
//! statistics. Every completion path funnels through the engine's
//! `complete_task` so graph state and task state stay consistent; this
//! component never advances the graph itself.

use crate::engine::Engine;
use crate::error::EngineError;
use crate::history::{HistoryAction, HistoryEntry};
use caseflow_core::{TaskId, UserId};
use caseflow_events::{DomainEvent, Envelope, EventPublisher};
use caseflow_notify::Notifier;
use caseflow_task::{Task, TaskDecision, TaskFilter, TaskKind, TaskStatus, TaskStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;

/// Counts of tasks by status, plus overdue pending work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskStats {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub rejected: usize,
    pub cancelled: usize,
    /// Pending tasks whose due date has passed.
    pub overdue: usize,
}

impl TaskStats {
    /// Returns the total number of tasks counted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.completed + self.rejected + self.cancelled
    }
}

/// The task lifecycle service.
pub struct TaskLifecycle {
    tasks: Arc<dyn TaskStore>,
    engine: Arc<Engine>,
    history: Arc<dyn crate::store::HistoryStore>,
    publisher: Arc<dyn EventPublisher>,
    notifier: Arc<Notifier>,
}

impl TaskLifecycle {
    /// Creates a new lifecycle service.
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        engine: Arc<Engine>,
        history: Arc<dyn crate::store::HistoryStore>,
        publisher: Arc<dyn EventPublisher>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            tasks,
            engine,
            history,
            publisher,
            notifier,
        }
    }

    /// Lists a user's tasks with optional status/kind filters.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn list_for_assignee(
        &self,
        user: &UserId,
        status: Option<TaskStatus>,
        kind: Option<TaskKind>,
    ) -> Result<Vec<Task>, EngineError> {
        Ok(self
            .tasks
            .list(&TaskFilter {
                assignee: Some(user.clone()),
                status,
                kind,
                ..TaskFilter::default()
            })
            .await?)
    }

    /// Lists tasks matching an arbitrary filter, paginated.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, EngineError> {
        Ok(self.tasks.list(filter).await?)
    }

    /// Returns a task by ID.
    ///
    /// # Errors
    ///
    /// Returns `TaskNotFound` if absent.
    pub async fn get(&self, id: TaskId) -> Result<Task, EngineError> {
        self.tasks
            .get(id)
            .await?
            .ok_or(EngineError::TaskNotFound { id })
    }

    /// Completes a task on behalf of a user.
    ///
    /// Verifies the caller is assigned and the task is in a completable
    /// status, then delegates to the engine.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for non-assignees and `InvalidState` for tasks
    /// that are not `pending` or `in_progress`.
    pub async fn complete(
        &self,
        task_id: TaskId,
        user: &UserId,
        decision: Option<TaskDecision>,
        task_data: JsonValue,
    ) -> Result<(), EngineError> {
        let task = self.get(task_id).await?;
        if !task.is_assigned_to(user) {
            return Err(EngineError::Forbidden {
                reason: format!("{user} is not assigned to task {task_id}"),
            });
        }
        if !task.status.is_completable() {
            return Err(EngineError::InvalidState {
                reason: format!(
                    "task {task_id} is {} and cannot be completed",
                    task.status.as_str()
                ),
            });
        }
        self.engine
            .complete_task(task_id, user, decision, task_data)
            .await
    }

    /// Hands a pending task to a different assignee.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless the task is still `pending`.
    pub async fn reassign(
        &self,
        task_id: TaskId,
        new_assignee: UserId,
        reassigned_by: &UserId,
    ) -> Result<Task, EngineError> {
        let mut task = self.get(task_id).await?;
        if task.status != TaskStatus::Pending {
            return Err(EngineError::InvalidState {
                reason: format!(
                    "task {task_id} is {} and can only be reassigned while pending",
                    task.status.as_str()
                ),
            });
        }

        let previous = task.assignee.replace(new_assignee.clone());
        self.tasks.update(&task).await?;

        if let Err(e) = self
            .history
            .append(
                &HistoryEntry::new(task.instance_id, HistoryAction::TaskReassigned)
                    .with_step(task.title.clone())
                    .with_user(reassigned_by.clone())
                    .with_data(json!({
                        "task_id": task.id,
                        "from": previous,
                        "to": new_assignee,
                    })),
            )
            .await
        {
            tracing::warn!(task_id = %task.id, error = %e, "failed to append reassignment history");
        }

        let event = DomainEvent::TaskReassigned {
            instance_id: task.instance_id,
            task_id: task.id,
            previous_assignee: previous,
            new_assignee: new_assignee.clone(),
            timestamp: Utc::now(),
        };
        if let Err(e) = self.publisher.publish(Envelope::new(event)).await {
            tracing::warn!(task_id = %task.id, error = %e, "failed to publish reassignment event");
        }

        let result = self
            .notifier
            .create(
                Some(new_assignee),
                "task_assigned",
                &task.title,
                format!("\"{}\" was reassigned to you", task.title),
                json!({"task_id": task.id, "instance_id": task.instance_id}),
            )
            .await;
        if let Err(e) = result {
            tracing::warn!(task_id = %task.id, error = %e, "failed to notify new assignee");
        }

        Ok(task)
    }

    /// Administrative status override.
    ///
    /// Bypasses assignment and status checks; the acting user is recorded
    /// in history so the audit trail shows the override.
    ///
    /// # Errors
    ///
    /// Returns `TaskNotFound` or storage errors.
    pub async fn set_status(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        set_by: &UserId,
    ) -> Result<Task, EngineError> {
        let mut task = self.get(task_id).await?;
        let previous = task.status;
        task.status = status;
        if status.is_terminal() && task.completed_at.is_none() {
            task.completed_at = Some(Utc::now());
        }
        self.tasks.update(&task).await?;

        if let Err(e) = self
            .history
            .append(
                &HistoryEntry::new(task.instance_id, HistoryAction::TaskStatusSet)
                    .with_step(task.title.clone())
                    .with_user(set_by.clone())
                    .with_data(json!({
                        "task_id": task.id,
                        "from": previous.as_str(),
                        "to": status.as_str(),
                    })),
            )
            .await
        {
            tracing::warn!(task_id = %task.id, error = %e, "failed to append status-override history");
        }

        Ok(task)
    }

    /// Aggregate statistics, optionally scoped to one assignee.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn stats(&self, assignee: Option<&UserId>) -> Result<TaskStats, EngineError> {
        let tasks = self
            .tasks
            .list(&TaskFilter {
                assignee: assignee.cloned(),
                ..TaskFilter::default()
            })
            .await?;

        let now = Utc::now();
        let mut stats = TaskStats::default();
        for task in &tasks {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::InProgress => stats.in_progress += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Rejected => stats.rejected += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
            if task.is_overdue(now) {
                stats.overdue += 1;
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::WorkflowDefinition;
    use crate::edge::Edge;
    use crate::engine::EngineServices;
    use crate::instance::InstanceStatus;
    use crate::node::{HumanTaskConfig, Node, NodeKind};
    use crate::store::{
        DefinitionStore, HistoryStore, InMemoryDefinitionStore, InMemoryHistoryStore,
        InMemoryInstanceStore, InstanceStore,
    };
    use crate::timer::InMemoryTimerStore;
    use caseflow_core::InstanceId;
    use caseflow_events::InMemoryEventPublisher;
    use caseflow_notify::{
        InMemoryNotificationStore, InMemorySubscriptionStore, NotificationStore, PushRegistry,
    };
    use caseflow_task::InMemoryTaskStore;
    use serde_json::{Map, json};

    struct Fixture {
        lifecycle: TaskLifecycle,
        definitions: InMemoryDefinitionStore,
        instances: InMemoryInstanceStore,
        tasks: InMemoryTaskStore,
        history: InMemoryHistoryStore,
        notifications: InMemoryNotificationStore,
        publisher: InMemoryEventPublisher,
        engine: Arc<Engine>,
    }

    fn fixture() -> Fixture {
        let definitions = InMemoryDefinitionStore::new();
        let instances = InMemoryInstanceStore::new();
        let tasks = InMemoryTaskStore::new();
        let history = InMemoryHistoryStore::new();
        let notifications = InMemoryNotificationStore::new();
        let publisher = InMemoryEventPublisher::new();
        let notifier = Arc::new(Notifier::new(
            Arc::new(notifications.clone()),
            Arc::new(publisher.clone()),
            PushRegistry::shared(),
        ));

        let engine = Arc::new(Engine::new(EngineServices {
            definitions: Arc::new(definitions.clone()),
            instances: Arc::new(instances.clone()),
            history: Arc::new(history.clone()),
            timers: Arc::new(InMemoryTimerStore::new()),
            tasks: Arc::new(tasks.clone()),
            subscriptions: Arc::new(InMemorySubscriptionStore::new()),
            publisher: Arc::new(publisher.clone()),
            notifier: Arc::clone(&notifier),
        }));

        let lifecycle = TaskLifecycle::new(
            Arc::new(tasks.clone()),
            Arc::clone(&engine),
            Arc::new(history.clone()),
            Arc::new(publisher.clone()),
            notifier,
        );

        Fixture {
            lifecycle,
            definitions,
            instances,
            tasks,
            history,
            notifications,
            publisher,
            engine,
        }
    }

    fn form_definition() -> WorkflowDefinition {
        let mut definition = WorkflowDefinition::new("One form");
        let start = definition
            .graph
            .add_node(Node::new("node_start", "Start", NodeKind::Start));
        let form = definition.graph.add_node(Node::new(
            "node_form",
            "Fill form",
            NodeKind::Form(HumanTaskConfig {
                assigned_to: json!("alice"),
                ..HumanTaskConfig::default()
            }),
        ));
        let end = definition
            .graph
            .add_node(Node::new("node_end", "End", NodeKind::End));
        definition
            .graph
            .add_edge(&start, &form, Edge::new("edge_0"))
            .unwrap();
        definition
            .graph
            .add_edge(&form, &end, Edge::new("edge_1"))
            .unwrap();
        definition
    }

    async fn started_task(fixture: &Fixture) -> (InstanceId, Task) {
        let definition = form_definition();
        fixture.definitions.create(&definition).await.unwrap();
        let instance = fixture
            .engine
            .start(definition.id, Map::new(), UserId::new("starter"))
            .await
            .unwrap();
        let task = fixture
            .tasks
            .list(&TaskFilter::default())
            .await
            .unwrap()
            .remove(0);
        (instance.id, task)
    }

    #[tokio::test]
    async fn complete_requires_assignment() {
        let fixture = fixture();
        let (_, task) = started_task(&fixture).await;

        let result = fixture
            .lifecycle
            .complete(task.id, &UserId::new("mallory"), None, JsonValue::Null)
            .await;
        assert!(matches!(result, Err(EngineError::Forbidden { .. })));
    }

    #[tokio::test]
    async fn complete_requires_completable_status() {
        let fixture = fixture();
        let (_, mut task) = started_task(&fixture).await;

        task.status = TaskStatus::Cancelled;
        fixture.tasks.update(&task).await.unwrap();

        let result = fixture
            .lifecycle
            .complete(task.id, &UserId::new("alice"), None, JsonValue::Null)
            .await;
        assert!(matches!(result, Err(EngineError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn complete_drives_the_engine() {
        let fixture = fixture();
        let (instance_id, task) = started_task(&fixture).await;

        fixture
            .lifecycle
            .complete(task.id, &UserId::new("alice"), None, json!({"ok": true}))
            .await
            .unwrap();

        let instance = fixture.instances.get(instance_id).await.unwrap().unwrap();
        assert_eq!(instance.status, InstanceStatus::Completed);
    }

    #[tokio::test]
    async fn reassign_moves_pending_tasks_only() {
        let fixture = fixture();
        let (_, task) = started_task(&fixture).await;

        let reassigned = fixture
            .lifecycle
            .reassign(task.id, UserId::new("bob"), &UserId::new("admin"))
            .await
            .unwrap();
        assert_eq!(reassigned.assignee, Some(UserId::new("bob")));

        // Event and notification fan-out happened.
        assert!(fixture.publisher.type_tags().contains(&"task.reassigned"));
        let inbox = fixture
            .notifications
            .list_for_user(&UserId::new("bob"), false)
            .await
            .unwrap();
        assert_eq!(inbox.len(), 1);

        // A second reassign fails once the task is no longer pending.
        let mut task = fixture.tasks.get(task.id).await.unwrap().unwrap();
        task.status = TaskStatus::InProgress;
        fixture.tasks.update(&task).await.unwrap();
        let result = fixture
            .lifecycle
            .reassign(task.id, UserId::new("carol"), &UserId::new("admin"))
            .await;
        assert!(matches!(result, Err(EngineError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn set_status_overrides_and_records_the_actor() {
        let fixture = fixture();
        let (instance_id, task) = started_task(&fixture).await;

        let updated = fixture
            .lifecycle
            .set_status(task.id, TaskStatus::Cancelled, &UserId::new("admin"))
            .await
            .unwrap();
        assert_eq!(updated.status, TaskStatus::Cancelled);
        assert!(updated.completed_at.is_some());

        let entries = fixture.history.list_for_instance(instance_id).await.unwrap();
        let override_entry = entries
            .iter()
            .find(|e| e.action == HistoryAction::TaskStatusSet)
            .unwrap();
        assert_eq!(override_entry.user, Some(UserId::new("admin")));
    }

    #[tokio::test]
    async fn list_for_assignee_filters_status() {
        let fixture = fixture();
        let (_, task) = started_task(&fixture).await;

        let pending = fixture
            .lifecycle
            .list_for_assignee(&UserId::new("alice"), Some(TaskStatus::Pending), None)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, task.id);

        let completed = fixture
            .lifecycle
            .list_for_assignee(&UserId::new("alice"), Some(TaskStatus::Completed), None)
            .await
            .unwrap();
        assert!(completed.is_empty());
    }

    #[tokio::test]
    async fn stats_count_statuses_and_overdue() {
        let fixture = fixture();
        let instance_id = InstanceId::new();

        let mut overdue = Task::new(
            instance_id,
            TaskKind::Task,
            "Overdue",
            Some(UserId::new("alice")),
        );
        overdue.due_at = Some(Utc::now() - chrono::Duration::days(1));
        fixture.tasks.create(&overdue).await.unwrap();

        let mut done = Task::new(
            instance_id,
            TaskKind::Task,
            "Done",
            Some(UserId::new("alice")),
        );
        done.complete(None);
        fixture.tasks.create(&done).await.unwrap();

        let other = Task::new(
            instance_id,
            TaskKind::Task,
            "Someone else's",
            Some(UserId::new("bob")),
        );
        fixture.tasks.create(&other).await.unwrap();

        let stats = fixture
            .lifecycle
            .stats(Some(&UserId::new("alice")))
            .await
            .unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.overdue, 1);
        assert_eq!(stats.total(), 2);

        let global = fixture.lifecycle.stats(None).await.unwrap();
        assert_eq!(global.total(), 3);
    }
}
