//! The workflow execution engine.
//!
//! The engine interprets a definition graph: it walks nodes, creates human
//! tasks where a node needs outside input, and advances the instance pointer
//! as that work completes. Execution is serialized per instance through a
//! keyed async mutex; different instances run fully in parallel.
//!
//! Failure policy: errors raised while walking the graph are not retried;
//! the instance transitions to `failed` with the error recorded. Errors from
//! auxiliary side effects (events, notifications) are logged and swallowed;
//! they never abort a committed transition.

use crate::assignee::normalize_assignees;
use crate::condition::LABEL_DEFAULT;
use crate::definition::WorkflowDefinition;
use crate::error::EngineError;
use crate::history::{HistoryAction, HistoryEntry};
use crate::instance::{InstanceStatus, WorkflowInstance};
use crate::node::{ApprovalConfig, ApprovalMode, HumanTaskConfig, Node, NodeId, NodeKind};
use crate::store::{DefinitionStore, HistoryStore, InstanceStore};
use crate::timer::{TimerRecord, TimerStore};
use caseflow_core::{DefinitionId, InstanceId, TaskId, UserId};
use caseflow_events::{DomainEvent, Envelope, EventPublisher};
use caseflow_notify::{Notifier, SubscriptionStore};
use caseflow_task::{Task, TaskDecision, TaskFilter, TaskKind, TaskStatus, TaskStore};
use chrono::Utc;
use serde_json::{Value as JsonValue, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Keys the engine embeds in approval task data.
const DATA_APPROVERS: &str = "approvers";
const DATA_APPROVER_INDEX: &str = "approver_index";
const DATA_APPROVAL_TYPE: &str = "approval_type";

/// The collaborators the engine is constructed from.
///
/// Everything is an injected trait object so the engine owns no global
/// state and tests can swap in in-memory doubles.
pub struct EngineServices {
    pub definitions: Arc<dyn DefinitionStore>,
    pub instances: Arc<dyn InstanceStore>,
    pub history: Arc<dyn HistoryStore>,
    pub timers: Arc<dyn TimerStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub publisher: Arc<dyn EventPublisher>,
    pub notifier: Arc<Notifier>,
}

/// The workflow execution engine.
pub struct Engine {
    services: EngineServices,
    /// Per-instance mutexes serializing resume/complete_task.
    instance_locks: Mutex<HashMap<InstanceId, Arc<tokio::sync::Mutex<()>>>>,
}

impl Engine {
    /// Creates a new engine.
    #[must_use]
    pub fn new(services: EngineServices) -> Self {
        Self {
            services,
            instance_locks: Mutex::new(HashMap::new()),
        }
    }

    fn instance_lock(&self, id: InstanceId) -> Arc<tokio::sync::Mutex<()>> {
        self.instance_locks
            .lock()
            .expect("instance lock registry poisoned")
            .entry(id)
            .or_default()
            .clone()
    }

    /// Starts a new instance of a definition and executes it until it
    /// suspends or terminates.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionNotFound` if the definition does not exist and
    /// `DefinitionInactive` if it is disabled.
    pub async fn start(
        &self,
        definition_id: DefinitionId,
        initial_data: serde_json::Map<String, JsonValue>,
        started_by: UserId,
    ) -> Result<WorkflowInstance, EngineError> {
        let definition = self
            .services
            .definitions
            .get(definition_id)
            .await?
            .ok_or(EngineError::DefinitionNotFound { id: definition_id })?;
        if !definition.is_active() {
            return Err(EngineError::DefinitionInactive { id: definition_id });
        }
        let start_node = definition
            .graph
            .start_node()
            .ok_or(EngineError::Validation {
                reason: format!("definition {definition_id} has no start node"),
            })?;

        let mut instance = WorkflowInstance::new(
            definition.id,
            start_node.id.clone(),
            initial_data,
            started_by.clone(),
        );
        self.services.instances.create(&instance).await?;

        self.record(
            HistoryEntry::new(instance.id, HistoryAction::WorkflowStarted)
                .with_step(start_node.label.clone())
                .with_user(started_by.clone()),
        )
        .await;
        self.emit(DomainEvent::WorkflowStarted {
            instance_id: instance.id,
            definition_id: definition.id,
            started_by,
            timestamp: Utc::now(),
        })
        .await;

        let lock = self.instance_lock(instance.id);
        let _guard = lock.lock().await;
        self.run(&definition, &mut instance).await;
        Ok(instance)
    }

    /// Re-entrant step driver: resumes execution from the current pointer.
    ///
    /// No-ops if the instance is not running.
    ///
    /// # Errors
    ///
    /// Returns `InstanceNotFound` if the instance does not exist. Execution
    /// errors are not returned: they fail the instance.
    pub async fn resume(&self, instance_id: InstanceId) -> Result<(), EngineError> {
        let lock = self.instance_lock(instance_id);
        let _guard = lock.lock().await;

        let mut instance = self
            .services
            .instances
            .get(instance_id)
            .await?
            .ok_or(EngineError::InstanceNotFound { id: instance_id })?;
        if instance.status != InstanceStatus::Running {
            tracing::debug!(
                instance_id = %instance_id,
                status = instance.status.as_str(),
                "resume ignored: instance is not running"
            );
            return Ok(());
        }

        let definition = self
            .services
            .definitions
            .get(instance.definition_id)
            .await?
            .ok_or(EngineError::DefinitionNotFound {
                id: instance.definition_id,
            })?;
        self.run(&definition, &mut instance).await;
        Ok(())
    }

    /// Records a human completion on a task, folds the result into the
    /// instance, applies aggregation rules, and advances the graph when the
    /// originating node is satisfied.
    ///
    /// # Errors
    ///
    /// Returns `TaskNotFound`/`InstanceNotFound` for missing entities and
    /// storage errors for persistence failures while folding. Errors raised
    /// after that, while advancing the graph, fail the instance instead.
    pub async fn complete_task(
        &self,
        task_id: TaskId,
        user: &UserId,
        decision: Option<TaskDecision>,
        task_data: JsonValue,
    ) -> Result<(), EngineError> {
        let preview = self
            .services
            .tasks
            .get(task_id)
            .await?
            .ok_or(EngineError::TaskNotFound { id: task_id })?;

        let lock = self.instance_lock(preview.instance_id);
        let _guard = lock.lock().await;

        // Reload under the instance lock.
        let mut task = self
            .services
            .tasks
            .get(task_id)
            .await?
            .ok_or(EngineError::TaskNotFound { id: task_id })?;
        let mut instance = self
            .services
            .instances
            .get(task.instance_id)
            .await?
            .ok_or(EngineError::InstanceNotFound {
                id: task.instance_id,
            })?;

        task.complete(decision);
        merge_task_data(&mut task, task_data);
        self.services.tasks.update(&task).await?;

        // Mirror the outcome into the instance data bag, keyed by the
        // originating node.
        if let Some(node_id) = &task.node_id {
            instance.set_data(
                node_id.clone(),
                json!({
                    "decision": decision.map(|d| d.as_str()),
                    "data": task.data.clone(),
                    "completed_by": user,
                }),
            );
            self.services.instances.update(&instance).await?;
        }

        self.record(
            HistoryEntry::new(instance.id, HistoryAction::TaskCompleted)
                .with_step(task.title.clone())
                .with_user(user.clone())
                .with_data(json!({
                    "task_id": task.id,
                    "decision": decision.map(|d| d.as_str()),
                })),
        )
        .await;
        self.emit(DomainEvent::TaskCompleted {
            instance_id: instance.id,
            task_id: task.id,
            completed_by: user.clone(),
            decision: decision.map(|d| d.as_str().to_string()),
            timestamp: Utc::now(),
        })
        .await;
        self.notify_subscribers(
            instance.id,
            "task_completed",
            "Task completed",
            format!("{user} completed \"{}\"", task.title),
        )
        .await;

        if instance.status != InstanceStatus::Running {
            tracing::debug!(
                instance_id = %instance.id,
                "task completion recorded on a non-running instance; graph not advanced"
            );
            return Ok(());
        }
        let Some(node_id_str) = task.node_id.clone() else {
            return Ok(());
        };
        let node_id = NodeId::new(node_id_str);
        if instance.current_node.as_ref() != Some(&node_id) {
            // The pointer already moved past this node.
            return Ok(());
        }

        let definition = self
            .services
            .definitions
            .get(instance.definition_id)
            .await?
            .ok_or(EngineError::DefinitionNotFound {
                id: instance.definition_id,
            })?;
        let Some(node) = definition.graph.get_node(&node_id) else {
            return Ok(());
        };

        let satisfied = match &node.kind {
            NodeKind::Approval(config) if config.approval_type == ApprovalMode::Sequential => {
                self.sequential_step(&instance, node, config, &task, decision)
                    .await?
            }
            _ => {
                // Parallel approvals and multi-assignee form/task nodes are
                // satisfied once no open task for the node remains.
                self.services
                    .tasks
                    .open_for_node(instance.id, node_id.as_str())
                    .await?
                    .is_empty()
            }
        };

        if satisfied {
            let result = async {
                self.finish_node(&definition, &mut instance, node).await?;
                self.drive(&definition, &mut instance).await
            }
            .await;
            if let Err(e) = result {
                tracing::error!(instance_id = %instance.id, error = %e, "execution failed");
                self.fail_locked(&mut instance, e.to_string()).await;
            }
        }
        Ok(())
    }

    /// Handles one completion within a sequential approval chain.
    ///
    /// Returns true when the node is satisfied (the last approver finished).
    /// A rejection is recorded but routes exactly like an approval; branching
    /// on rejection awaits product definition.
    async fn sequential_step(
        &self,
        instance: &WorkflowInstance,
        node: &Node,
        config: &ApprovalConfig,
        task: &Task,
        decision: Option<TaskDecision>,
    ) -> Result<bool, EngineError> {
        if decision.is_some_and(|d| d.is_rejection()) {
            tracing::warn!(
                instance_id = %instance.id,
                task_id = %task.id,
                "sequential approval rejected; continuing the chain unchanged"
            );
        }

        let approvers: Vec<UserId> = task
            .data
            .get(DATA_APPROVERS)
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .unwrap_or_default()
            .unwrap_or_default();
        let index = task
            .data
            .get(DATA_APPROVER_INDEX)
            .and_then(JsonValue::as_u64)
            .unwrap_or(0) as usize;

        if index + 1 < approvers.len() {
            self.create_approval_task(instance, node, config, &approvers, index + 1)
                .await?;
            Ok(false)
        } else {
            Ok(true)
        }
    }

    /// Terminal transition: marks the instance failed.
    ///
    /// Idempotent: failing an already-terminal instance is a logged no-op,
    /// never retried.
    ///
    /// # Errors
    ///
    /// Returns `InstanceNotFound` if the instance does not exist.
    pub async fn fail(
        &self,
        instance_id: InstanceId,
        message: impl Into<String>,
    ) -> Result<(), EngineError> {
        let lock = self.instance_lock(instance_id);
        let _guard = lock.lock().await;

        let mut instance = self
            .services
            .instances
            .get(instance_id)
            .await?
            .ok_or(EngineError::InstanceNotFound { id: instance_id })?;
        self.fail_locked(&mut instance, message.into()).await;
        Ok(())
    }

    /// Terminal transition: cancels the instance and its pending tasks.
    ///
    /// Tasks already in progress are not forcibly stopped; only the instance
    /// status changes. Idempotent on terminal instances.
    ///
    /// # Errors
    ///
    /// Returns `InstanceNotFound` if the instance does not exist.
    pub async fn cancel(&self, instance_id: InstanceId, user: &UserId) -> Result<(), EngineError> {
        let lock = self.instance_lock(instance_id);
        let _guard = lock.lock().await;

        let mut instance = self
            .services
            .instances
            .get(instance_id)
            .await?
            .ok_or(EngineError::InstanceNotFound { id: instance_id })?;
        if instance.is_terminal() {
            tracing::debug!(
                instance_id = %instance_id,
                status = instance.status.as_str(),
                "cancel ignored: instance already terminal"
            );
            return Ok(());
        }

        let pending = self
            .services
            .tasks
            .list(&TaskFilter {
                instance_id: Some(instance_id),
                status: Some(TaskStatus::Pending),
                ..TaskFilter::default()
            })
            .await?;
        for mut task in pending {
            task.cancel();
            self.services.tasks.update(&task).await?;
        }

        instance.cancel();
        self.services.instances.update(&instance).await?;

        self.record(
            HistoryEntry::new(instance_id, HistoryAction::WorkflowCancelled)
                .with_user(user.clone()),
        )
        .await;
        self.emit(DomainEvent::WorkflowCancelled {
            instance_id,
            cancelled_by: Some(user.clone()),
            timestamp: Utc::now(),
        })
        .await;
        self.notify_subscribers(
            instance_id,
            "workflow_cancelled",
            "Workflow cancelled",
            format!("{user} cancelled the workflow"),
        )
        .await;
        Ok(())
    }

    /// Claims every due timer record and resumes the owning instances.
    ///
    /// Returns the number of records claimed. Intended to run on a periodic
    /// schedule; safe to run concurrently because claiming is exactly-once.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the claim; per-instance resume failures
    /// are logged and do not stop the sweep.
    pub async fn sweep_due_timers(&self) -> Result<usize, EngineError> {
        let due = self.services.timers.claim_due(Utc::now()).await?;
        let claimed = due.len();
        for record in due {
            if let Err(e) = self.resume(record.instance_id).await {
                tracing::warn!(
                    instance_id = %record.instance_id,
                    error = %e,
                    "failed to resume instance from timer"
                );
            }
        }
        Ok(claimed)
    }

    /// Runs the drive loop, converting execution errors into instance
    /// failure per the fail-fast policy.
    async fn run(&self, definition: &WorkflowDefinition, instance: &mut WorkflowInstance) {
        if let Err(e) = self.drive(definition, instance).await {
            tracing::error!(instance_id = %instance.id, error = %e, "execution failed");
            self.fail_locked(instance, e.to_string()).await;
        }
    }

    /// The step loop: dispatches the node under the pointer until the
    /// instance suspends on human work or terminates.
    async fn drive(
        &self,
        definition: &WorkflowDefinition,
        instance: &mut WorkflowInstance,
    ) -> Result<(), EngineError> {
        while instance.status == InstanceStatus::Running {
            let Some(node_id) = instance.current_node.clone() else {
                self.complete_locked(instance).await?;
                break;
            };
            let Some(node) = definition.graph.get_node(&node_id) else {
                // Graph exhaustion: the pointer left the graph.
                self.complete_locked(instance).await?;
                break;
            };

            self.record(
                HistoryEntry::new(instance.id, HistoryAction::NodeStarted)
                    .with_step(node.label.clone()),
            )
            .await;
            self.emit(DomainEvent::NodeStarted {
                instance_id: instance.id,
                node_id: node.id.to_string(),
                node_type: node.kind.type_tag().to_string(),
                timestamp: Utc::now(),
            })
            .await;
            self.notify_subscribers(
                instance.id,
                "node_started",
                "Step started",
                format!("Step \"{}\" started", node.label),
            )
            .await;

            match &node.kind {
                NodeKind::Start => {
                    self.finish_node(definition, instance, node).await?;
                }
                NodeKind::End => {
                    self.complete_locked(instance).await?;
                }
                NodeKind::Variable(config) => {
                    instance.merge_data(config.variables.clone());
                    self.finish_node(definition, instance, node).await?;
                }
                NodeKind::Form(config) => {
                    if self.dispatch_human_node(instance, node, TaskKind::Form, config).await? {
                        break;
                    }
                    self.finish_node(definition, instance, node).await?;
                }
                NodeKind::Task(config) => {
                    if self.dispatch_human_node(instance, node, TaskKind::Task, config).await? {
                        break;
                    }
                    self.finish_node(definition, instance, node).await?;
                }
                NodeKind::Approval(config) => {
                    if self.dispatch_approval_node(instance, node, config).await? {
                        break;
                    }
                    self.finish_node(definition, instance, node).await?;
                }
                NodeKind::Condition(config) => {
                    let label = config.condition.evaluate_label(&instance.data);
                    let next = definition
                        .graph
                        .next_labeled(&node.id, label)
                        .or_else(|| definition.graph.next_labeled(&node.id, LABEL_DEFAULT));
                    match next {
                        Some(next) => {
                            let next_id = next.id.clone();
                            self.node_completed(instance, node).await;
                            instance.advance_to(next_id);
                            self.services.instances.update(instance).await?;
                        }
                        None => {
                            return Err(EngineError::Routing {
                                node_id: node.id.clone(),
                                label: label.to_string(),
                            });
                        }
                    }
                }
                NodeKind::Timer(config) => {
                    match definition.graph.next_after(&node.id) {
                        Some(next) => {
                            let next_id = next.id.clone();
                            self.node_completed(instance, node).await;
                            instance.advance_to(next_id);
                            self.services.instances.update(instance).await?;

                            let record =
                                TimerRecord::after(instance.id, config.delay_duration());
                            self.services.timers.schedule(&record).await?;
                            self.record(
                                HistoryEntry::new(instance.id, HistoryAction::TimerScheduled)
                                    .with_step(node.label.clone())
                                    .with_data(json!({"due_at": record.due_at})),
                            )
                            .await;
                            break;
                        }
                        None => {
                            self.complete_locked(instance).await?;
                        }
                    }
                }
                NodeKind::Notify(channel, config) => {
                    let title = config.title.clone().unwrap_or_else(|| node.label.clone());
                    let message = config.message.clone().unwrap_or_default();
                    for recipient in normalize_assignees(&config.recipients) {
                        self.notify_user(
                            recipient,
                            channel.as_str(),
                            &title,
                            message.clone(),
                            json!({"instance_id": instance.id}),
                        )
                        .await;
                    }
                    self.finish_node(definition, instance, node).await?;
                }
                NodeKind::Unrecognized { kind, .. } => {
                    tracing::warn!(
                        instance_id = %instance.id,
                        node_id = %node.id,
                        node_type = %kind,
                        "unrecognized node type; advancing"
                    );
                    self.finish_node(definition, instance, node).await?;
                }
            }
        }
        Ok(())
    }

    /// Creates tasks for a form/task node.
    ///
    /// Returns true if the node suspends execution (tasks are open).
    async fn dispatch_human_node(
        &self,
        instance: &WorkflowInstance,
        node: &Node,
        kind: TaskKind,
        config: &HumanTaskConfig,
    ) -> Result<bool, EngineError> {
        // Re-entry guard: if the node already has open tasks, suspend
        // without creating duplicates.
        if !self
            .services
            .tasks
            .open_for_node(instance.id, node.id.as_str())
            .await?
            .is_empty()
        {
            return Ok(true);
        }

        let assignees = normalize_assignees(&config.assigned_to);
        if assignees.is_empty() {
            tracing::warn!(
                instance_id = %instance.id,
                node_id = %node.id,
                "node resolved no assignees; advancing"
            );
            return Ok(false);
        }

        for assignee in assignees {
            let mut task = Task::new(instance.id, kind, node.label.clone(), Some(assignee));
            task.node_id = Some(node.id.to_string());
            task.priority = config.priority.unwrap_or_default();
            task.due_at = config.due_date;
            task.form_schema = config.form_fields.clone();
            task.originator = Some(instance.started_by.clone());
            task.data = json!({
                "form_id": config.form_id,
                "instructions": config.instructions,
            });
            self.persist_task(instance, node, task).await?;
        }
        Ok(true)
    }

    /// Creates tasks for an approval node.
    ///
    /// Returns true if the node suspends execution.
    async fn dispatch_approval_node(
        &self,
        instance: &WorkflowInstance,
        node: &Node,
        config: &ApprovalConfig,
    ) -> Result<bool, EngineError> {
        if !self
            .services
            .tasks
            .open_for_node(instance.id, node.id.as_str())
            .await?
            .is_empty()
        {
            return Ok(true);
        }

        let approvers = normalize_assignees(&config.approvers);
        if approvers.is_empty() {
            tracing::warn!(
                instance_id = %instance.id,
                node_id = %node.id,
                "approval node resolved no approvers; advancing"
            );
            return Ok(false);
        }

        match config.approval_type {
            ApprovalMode::Sequential => {
                self.create_approval_task(instance, node, config, &approvers, 0)
                    .await?;
            }
            ApprovalMode::Parallel => {
                for index in 0..approvers.len() {
                    self.create_approval_task(instance, node, config, &approvers, index)
                        .await?;
                }
            }
        }
        Ok(true)
    }

    /// Creates one approval task, embedding the approver list and cursor.
    async fn create_approval_task(
        &self,
        instance: &WorkflowInstance,
        node: &Node,
        config: &ApprovalConfig,
        approvers: &[UserId],
        index: usize,
    ) -> Result<Task, EngineError> {
        let assignee = approvers[index].clone();
        let mut task = Task::new(
            instance.id,
            TaskKind::Approval,
            node.label.clone(),
            Some(assignee),
        );
        task.node_id = Some(node.id.to_string());
        task.priority = config.priority.unwrap_or_default();
        task.originator = Some(instance.started_by.clone());
        task.data = json!({
            DATA_APPROVERS: approvers,
            DATA_APPROVER_INDEX: index,
            DATA_APPROVAL_TYPE: config.approval_type,
        });
        self.persist_task(instance, node, task).await
    }

    /// Persists a task and fans out its creation signals.
    async fn persist_task(
        &self,
        instance: &WorkflowInstance,
        node: &Node,
        task: Task,
    ) -> Result<Task, EngineError> {
        self.services.tasks.create(&task).await?;

        self.record(
            HistoryEntry::new(instance.id, HistoryAction::TaskCreated)
                .with_step(node.label.clone())
                .with_data(json!({
                    "task_id": task.id,
                    "assignee": task.assignee,
                })),
        )
        .await;
        self.emit(DomainEvent::TaskCreated {
            instance_id: instance.id,
            task_id: task.id,
            node_id: task.node_id.clone(),
            assignee: task.assignee.clone(),
            timestamp: Utc::now(),
        })
        .await;
        if let Some(assignee) = task.assignee.clone() {
            self.notify_user(
                assignee,
                "task_assigned",
                &task.title,
                format!("You have been assigned \"{}\"", task.title),
                json!({"task_id": task.id, "instance_id": instance.id}),
            )
            .await;
        }
        Ok(task)
    }

    /// Marks a node complete and moves the pointer along the first outgoing
    /// edge; absence of an outgoing edge is implicit completion.
    async fn finish_node(
        &self,
        definition: &WorkflowDefinition,
        instance: &mut WorkflowInstance,
        node: &Node,
    ) -> Result<(), EngineError> {
        self.node_completed(instance, node).await;
        match definition.graph.next_after(&node.id) {
            Some(next) => {
                let next_id = next.id.clone();
                instance.advance_to(next_id);
                self.services.instances.update(instance).await?;
            }
            None => {
                self.complete_locked(instance).await?;
            }
        }
        Ok(())
    }

    /// Emits the node-completed history entry, event, and subscriber
    /// notifications.
    async fn node_completed(&self, instance: &WorkflowInstance, node: &Node) {
        self.record(
            HistoryEntry::new(instance.id, HistoryAction::NodeCompleted)
                .with_step(node.label.clone()),
        )
        .await;
        self.emit(DomainEvent::NodeCompleted {
            instance_id: instance.id,
            node_id: node.id.to_string(),
            timestamp: Utc::now(),
        })
        .await;
        self.notify_subscribers(
            instance.id,
            "node_completed",
            "Step completed",
            format!("Step \"{}\" completed", node.label),
        )
        .await;
    }

    /// Terminal transition to `completed`; idempotent.
    async fn complete_locked(
        &self,
        instance: &mut WorkflowInstance,
    ) -> Result<(), EngineError> {
        if instance.is_terminal() {
            tracing::debug!(
                instance_id = %instance.id,
                status = instance.status.as_str(),
                "completion ignored: instance already terminal"
            );
            return Ok(());
        }
        instance.complete();
        self.services.instances.update(instance).await?;

        self.record(HistoryEntry::new(instance.id, HistoryAction::WorkflowCompleted))
            .await;
        self.emit(DomainEvent::WorkflowCompleted {
            instance_id: instance.id,
            timestamp: Utc::now(),
        })
        .await;
        self.notify_subscribers(
            instance.id,
            "workflow_completed",
            "Workflow completed",
            "The workflow finished successfully".to_string(),
        )
        .await;
        Ok(())
    }

    /// Terminal transition to `failed`; idempotent, best-effort persistence.
    async fn fail_locked(&self, instance: &mut WorkflowInstance, message: String) {
        if instance.is_terminal() {
            tracing::debug!(
                instance_id = %instance.id,
                status = instance.status.as_str(),
                "failure ignored: instance already terminal"
            );
            return;
        }
        instance.fail(message.clone());
        if let Err(e) = self.services.instances.update(instance).await {
            tracing::error!(instance_id = %instance.id, error = %e, "failed to persist instance failure");
        }

        self.record(
            HistoryEntry::new(instance.id, HistoryAction::WorkflowFailed)
                .with_data(json!({"error": message})),
        )
        .await;
        self.emit(DomainEvent::WorkflowFailed {
            instance_id: instance.id,
            error: message.clone(),
            timestamp: Utc::now(),
        })
        .await;
        self.notify_subscribers(
            instance.id,
            "workflow_failed",
            "Workflow failed",
            message,
        )
        .await;
    }

    /// Appends a history entry, logging (not propagating) failures.
    async fn record(&self, entry: HistoryEntry) {
        if let Err(e) = self.services.history.append(&entry).await {
            tracing::warn!(
                instance_id = %entry.instance_id,
                error = %e,
                "failed to append history entry"
            );
        }
    }

    /// Publishes a domain event, logging (not propagating) failures.
    async fn emit(&self, event: DomainEvent) {
        if let Err(e) = self.services.publisher.publish(Envelope::new(event)).await {
            tracing::warn!(error = %e, "failed to publish domain event");
        }
    }

    /// Creates one best-effort notification.
    async fn notify_user(
        &self,
        recipient: UserId,
        category: &str,
        title: &str,
        message: String,
        data: JsonValue,
    ) {
        if let Err(e) = self
            .services
            .notifier
            .create(Some(recipient), category, title, message, data)
            .await
        {
            tracing::warn!(error = %e, "failed to create notification");
        }
    }

    /// Fans a progress notification out to every instance subscriber.
    async fn notify_subscribers(
        &self,
        instance_id: InstanceId,
        category: &str,
        title: &str,
        message: String,
    ) {
        let subscribers = match self.services.subscriptions.subscribers_of(instance_id).await {
            Ok(subscribers) => subscribers,
            Err(e) => {
                tracing::warn!(instance_id = %instance_id, error = %e, "failed to load subscribers");
                return;
            }
        };
        for user in subscribers {
            self.notify_user(
                user,
                category,
                title,
                message.clone(),
                json!({"instance_id": instance_id}),
            )
            .await;
        }
    }
}

/// Folds caller-supplied completion data into the task's data payload.
fn merge_task_data(task: &mut Task, incoming: JsonValue) {
    match (&mut task.data, incoming) {
        (_, JsonValue::Null) => {}
        (JsonValue::Object(existing), JsonValue::Object(update)) => {
            for (key, value) in update {
                existing.insert(key, value);
            }
        }
        (slot, other) => *slot = other,
    }
}
