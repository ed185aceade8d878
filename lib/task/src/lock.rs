//! Form lock and draft service.
//!
//! A lease-based advisory lock prevents two users from clobbering each
//! other's form edits. The lease exists for humans, not for storage
//! atomicity: a single save is atomic at the storage layer, the lease stops
//! a second editor from starting at all. Expiry is a wall-clock comparison
//! at request time; the periodic sweep is hygiene, not correctness.

use crate::error::TaskError;
use crate::store::TaskStore;
use crate::task::{Task, TaskStatus};
use caseflow_core::{TaskId, UserId};
use caseflow_notify::Notifier;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};
use std::sync::Arc;

/// Default form lease duration.
pub const DEFAULT_LEASE_MINUTES: i64 = 15;

/// The answer to "may this user edit this task's form right now?".
///
/// Denials are values, not errors, so the calling surface can render the
/// reason instead of treating contention as a system failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditPermission {
    /// Whether editing is allowed.
    pub allowed: bool,
    /// Why it is not, when denied.
    pub reason: Option<String>,
}

impl EditPermission {
    /// Permission granted.
    #[must_use]
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    /// Permission denied with a user-renderable reason.
    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Lease-based mutual exclusion and draft/submission handling for task forms.
pub struct FormLockService {
    tasks: Arc<dyn TaskStore>,
    notifier: Arc<Notifier>,
    lease: Duration,
}

impl FormLockService {
    /// Creates a service with the default 15-minute lease.
    pub fn new(tasks: Arc<dyn TaskStore>, notifier: Arc<Notifier>) -> Self {
        Self::with_lease(tasks, notifier, Duration::minutes(DEFAULT_LEASE_MINUTES))
    }

    /// Creates a service with an explicit lease duration.
    pub fn with_lease(tasks: Arc<dyn TaskStore>, notifier: Arc<Notifier>, lease: Duration) -> Self {
        Self {
            tasks,
            notifier,
            lease,
        }
    }

    async fn load(&self, id: TaskId) -> Result<Task, TaskError> {
        self.tasks
            .get(id)
            .await?
            .ok_or(TaskError::NotFound { id })
    }

    /// Acquires the form lease for a user.
    ///
    /// An expired lease is silently reclaimed; a live lease held by someone
    /// else is a conflict.
    ///
    /// # Errors
    ///
    /// Returns `LockConflict` if another user holds an unexpired lease.
    pub async fn lock(&self, task_id: TaskId, user: &UserId) -> Result<(), TaskError> {
        let mut task = self.load(task_id).await?;

        if let Some(owner) = &task.lock_owner
            && owner != user
            && !task.lease_expired(self.lease, Utc::now())
        {
            return Err(TaskError::LockConflict {
                id: task_id,
                owner: owner.clone(),
            });
        }

        task.grant_lease(user);
        self.tasks.update(&task).await
    }

    /// Releases the form lease.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless the caller owns the lease or `force` is set.
    pub async fn unlock(&self, task_id: TaskId, user: &UserId, force: bool) -> Result<(), TaskError> {
        let mut task = self.load(task_id).await?;

        if let Some(owner) = &task.lock_owner
            && owner != user
            && !force
        {
            return Err(TaskError::Forbidden {
                reason: format!("lease is held by {owner}"),
            });
        }

        task.clear_lease();
        self.tasks.update(&task).await
    }

    /// Answers whether a user may edit the task's form right now.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the task does not exist; every other outcome is
    /// a structured permission value.
    pub async fn can_edit(
        &self,
        task_id: TaskId,
        user: &UserId,
    ) -> Result<EditPermission, TaskError> {
        let task = self.load(task_id).await?;
        Ok(self.edit_permission(&task, user))
    }

    fn edit_permission(&self, task: &Task, user: &UserId) -> EditPermission {
        if task.status.is_terminal() {
            return EditPermission::deny(format!(
                "task is {} and can no longer be edited",
                task.status.as_str()
            ));
        }
        if !task.is_assigned_to(user) {
            return EditPermission::deny("you are not assigned to this task");
        }
        if let Some(owner) = &task.lock_owner
            && owner != user
            && !task.lease_expired(self.lease, Utc::now())
        {
            return EditPermission::deny(format!("form is being edited by {owner}"));
        }
        EditPermission::allow()
    }

    /// Saves a draft of the form.
    ///
    /// Fields the user is not authorized to edit are silently dropped, the
    /// remainder is merged over the existing form data, and the lease is
    /// released; the client must re-lock to continue editing. Progress of
    /// 100 promotes a pending task to in-progress.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` with the denial reason if editing is not allowed.
    pub async fn save_draft(
        &self,
        task_id: TaskId,
        user: &UserId,
        form_data: Map<String, JsonValue>,
        progress: u8,
    ) -> Result<Task, TaskError> {
        let mut task = self.load(task_id).await?;

        let permission = self.edit_permission(&task, user);
        if !permission.allowed {
            return Err(TaskError::Forbidden {
                reason: permission.reason.unwrap_or_default(),
            });
        }

        for (name, value) in form_data {
            let authorized = match &task.form_schema {
                Some(schema) => !schema.has_field(&name) || schema.editable_fields(user).contains(&name),
                None => true,
            };
            if authorized {
                task.form_data.insert(name, value);
            }
        }

        task.form_progress = progress.min(100);
        task.clear_lease();
        if task.form_progress >= 100 && task.status == TaskStatus::Pending {
            task.status = TaskStatus::InProgress;
        }
        self.tasks.update(&task).await?;

        self.notify_peers(
            &task,
            user,
            "form_draft",
            "Draft saved",
            format!("{user} saved a draft of \"{}\"", task.title),
        )
        .await;

        Ok(task)
    }

    /// Finalizes the form.
    ///
    /// Replaces the form data outright, marks the task completed with full
    /// progress, and clears the lease. Submission does not advance the
    /// workflow graph; the caller drives the engine's completion path
    /// separately.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` with the denial reason if editing is not allowed.
    pub async fn submit(
        &self,
        task_id: TaskId,
        user: &UserId,
        form_data: Map<String, JsonValue>,
    ) -> Result<Task, TaskError> {
        let mut task = self.load(task_id).await?;

        let permission = self.edit_permission(&task, user);
        if !permission.allowed {
            return Err(TaskError::Forbidden {
                reason: permission.reason.unwrap_or_default(),
            });
        }

        task.form_data = form_data;
        task.form_progress = 100;
        task.status = TaskStatus::Completed;
        task.completed_at = Some(Utc::now());
        task.submitted_by = Some(user.clone());
        task.clear_lease();
        self.tasks.update(&task).await?;

        self.notify_peers(
            &task,
            user,
            "form_submitted",
            "Form submitted",
            format!("{user} submitted \"{}\"", task.title),
        )
        .await;

        Ok(task)
    }

    /// Releases every lease older than the lease duration.
    ///
    /// Idempotent; intended to run on a periodic schedule owned by the
    /// embedding process.
    ///
    /// # Errors
    ///
    /// Returns storage errors; individual releases are all-or-nothing per
    /// task.
    pub async fn clean_expired_locks(&self) -> Result<usize, TaskError> {
        let now = Utc::now();
        let mut released = 0;

        for mut task in self.tasks.list_locked().await? {
            if task.lease_expired(self.lease, now) {
                task.clear_lease();
                self.tasks.update(&task).await?;
                released += 1;
            }
        }

        if released > 0 {
            tracing::info!(released, "released expired form leases");
        }
        Ok(released)
    }

    /// Notifies the other assignees and the instance originator.
    async fn notify_peers(
        &self,
        task: &Task,
        actor: &UserId,
        category: &str,
        title: &str,
        message: String,
    ) {
        let mut recipients: Vec<UserId> = task
            .assignees()
            .into_iter()
            .filter(|u| *u != actor)
            .cloned()
            .collect();
        if let Some(originator) = &task.originator
            && originator != actor
            && !recipients.contains(originator)
        {
            recipients.push(originator.clone());
        }

        for recipient in recipients {
            let result = self
                .notifier
                .create(
                    Some(recipient),
                    category,
                    title,
                    message.clone(),
                    json!({
                        "task_id": task.id,
                        "instance_id": task.instance_id,
                        "form_progress": task.form_progress,
                    }),
                )
                .await;
            if let Err(e) = result {
                tracing::warn!(task_id = %task.id, error = %e, "failed to create form notification");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FormField, FormSchema};
    use crate::store::InMemoryTaskStore;
    use crate::task::TaskKind;
    use caseflow_core::InstanceId;
    use caseflow_events::InMemoryEventPublisher;
    use caseflow_notify::{InMemoryNotificationStore, NotificationStore, PushRegistry};

    struct Fixture {
        service: FormLockService,
        tasks: InMemoryTaskStore,
        notifications: InMemoryNotificationStore,
    }

    fn fixture() -> Fixture {
        let tasks = InMemoryTaskStore::new();
        let notifications = InMemoryNotificationStore::new();
        let notifier = Notifier::new(
            Arc::new(notifications.clone()),
            Arc::new(InMemoryEventPublisher::new()),
            PushRegistry::shared(),
        );
        let service = FormLockService::new(Arc::new(tasks.clone()), Arc::new(notifier));
        Fixture {
            service,
            tasks,
            notifications,
        }
    }

    async fn seed_task(fixture: &Fixture) -> Task {
        let mut task = Task::new(
            InstanceId::new(),
            TaskKind::Form,
            "Expense request",
            Some(UserId::new("u1")),
        );
        task.co_assignees.push(UserId::new("u2"));
        fixture.tasks.create(&task).await.unwrap();
        task
    }

    #[tokio::test]
    async fn lock_conflicts_within_lease_window() {
        let fixture = fixture();
        let task = seed_task(&fixture).await;

        fixture
            .service
            .lock(task.id, &UserId::new("u1"))
            .await
            .unwrap();

        let result = fixture.service.lock(task.id, &UserId::new("u2")).await;
        assert!(matches!(result, Err(TaskError::LockConflict { .. })));
    }

    #[tokio::test]
    async fn expired_lease_is_silently_reclaimed() {
        let fixture = fixture();
        let mut task = seed_task(&fixture).await;

        task.lock_owner = Some(UserId::new("u1"));
        task.locked_at = Some(Utc::now() - Duration::minutes(DEFAULT_LEASE_MINUTES + 1));
        fixture.tasks.update(&task).await.unwrap();

        fixture
            .service
            .lock(task.id, &UserId::new("u2"))
            .await
            .unwrap();

        let stored = fixture.tasks.get(task.id).await.unwrap().unwrap();
        assert_eq!(stored.lock_owner, Some(UserId::new("u2")));
    }

    #[tokio::test]
    async fn unlock_requires_ownership_or_force() {
        let fixture = fixture();
        let task = seed_task(&fixture).await;
        let u1 = UserId::new("u1");
        let u2 = UserId::new("u2");

        fixture.service.lock(task.id, &u1).await.unwrap();

        let result = fixture.service.unlock(task.id, &u2, false).await;
        assert!(matches!(result, Err(TaskError::Forbidden { .. })));

        fixture.service.unlock(task.id, &u2, true).await.unwrap();
        let stored = fixture.tasks.get(task.id).await.unwrap().unwrap();
        assert!(stored.lock_owner.is_none());
    }

    #[tokio::test]
    async fn can_edit_denies_non_assignees_and_terminal_tasks() {
        let fixture = fixture();
        let mut task = seed_task(&fixture).await;

        let outsider = fixture
            .service
            .can_edit(task.id, &UserId::new("mallory"))
            .await
            .unwrap();
        assert!(!outsider.allowed);
        assert!(outsider.reason.is_some());

        task.status = TaskStatus::Completed;
        fixture.tasks.update(&task).await.unwrap();
        let closed = fixture
            .service
            .can_edit(task.id, &UserId::new("u1"))
            .await
            .unwrap();
        assert!(!closed.allowed);
    }

    #[tokio::test]
    async fn can_edit_denies_while_other_user_holds_lease() {
        let fixture = fixture();
        let task = seed_task(&fixture).await;

        fixture
            .service
            .lock(task.id, &UserId::new("u1"))
            .await
            .unwrap();

        let blocked = fixture
            .service
            .can_edit(task.id, &UserId::new("u2"))
            .await
            .unwrap();
        assert!(!blocked.allowed);

        let owner = fixture
            .service
            .can_edit(task.id, &UserId::new("u1"))
            .await
            .unwrap();
        assert!(owner.allowed);
    }

    #[tokio::test]
    async fn save_draft_drops_unauthorized_fields_and_merges() {
        let fixture = fixture();
        let mut task = seed_task(&fixture).await;
        task.form_schema = Some(FormSchema::new(vec![
            FormField::new("name"),
            FormField::new("salary").restricted_to(vec![UserId::new("u2")]),
        ]));
        task.form_data
            .insert("department".to_string(), json!("engineering"));
        fixture.tasks.update(&task).await.unwrap();

        let mut submitted = Map::new();
        submitted.insert("salary".to_string(), json!(99999));
        submitted.insert("name".to_string(), json!("x"));

        let saved = fixture
            .service
            .save_draft(task.id, &UserId::new("u1"), submitted, 40)
            .await
            .unwrap();

        assert_eq!(saved.form_data.get("name"), Some(&json!("x")));
        assert!(saved.form_data.get("salary").is_none());
        // Unrelated previously-saved fields survive the merge.
        assert_eq!(saved.form_data.get("department"), Some(&json!("engineering")));
        assert_eq!(saved.form_progress, 40);
    }

    #[tokio::test]
    async fn save_draft_releases_lease_and_promotes_at_full_progress() {
        let fixture = fixture();
        let task = seed_task(&fixture).await;
        let u1 = UserId::new("u1");

        fixture.service.lock(task.id, &u1).await.unwrap();
        let saved = fixture
            .service
            .save_draft(task.id, &u1, Map::new(), 100)
            .await
            .unwrap();

        assert!(saved.lock_owner.is_none());
        assert_eq!(saved.status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn save_draft_notifies_peers_and_originator() {
        let fixture = fixture();
        let mut task = seed_task(&fixture).await;
        task.originator = Some(UserId::new("boss"));
        fixture.tasks.update(&task).await.unwrap();

        fixture
            .service
            .save_draft(task.id, &UserId::new("u1"), Map::new(), 10)
            .await
            .unwrap();

        let to_peer = fixture
            .notifications
            .list_for_user(&UserId::new("u2"), false)
            .await
            .unwrap();
        assert_eq!(to_peer.len(), 1);
        assert_eq!(to_peer[0].category, "form_draft");

        let to_boss = fixture
            .notifications
            .list_for_user(&UserId::new("boss"), false)
            .await
            .unwrap();
        assert_eq!(to_boss.len(), 1);

        // The actor does not notify themselves.
        let to_actor = fixture
            .notifications
            .list_for_user(&UserId::new("u1"), false)
            .await
            .unwrap();
        assert!(to_actor.is_empty());
    }

    #[tokio::test]
    async fn submit_finalizes_the_form() {
        let fixture = fixture();
        let task = seed_task(&fixture).await;
        let u1 = UserId::new("u1");

        fixture.service.lock(task.id, &u1).await.unwrap();

        let mut form = Map::new();
        form.insert("name".to_string(), json!("final"));
        let submitted = fixture.service.submit(task.id, &u1, form).await.unwrap();

        assert_eq!(submitted.form_progress, 100);
        assert_eq!(submitted.status, TaskStatus::Completed);
        assert!(submitted.completed_at.is_some());
        assert_eq!(submitted.submitted_by, Some(u1));
        assert!(submitted.lock_owner.is_none());
        assert!(submitted.locked_at.is_none());
    }

    #[tokio::test]
    async fn clean_expired_locks_releases_only_expired_leases() {
        let fixture = fixture();
        let expired = seed_task(&fixture).await;
        let live = seed_task(&fixture).await;

        let mut expired_task = fixture.tasks.get(expired.id).await.unwrap().unwrap();
        expired_task.lock_owner = Some(UserId::new("u1"));
        expired_task.locked_at = Some(Utc::now() - Duration::minutes(DEFAULT_LEASE_MINUTES + 5));
        fixture.tasks.update(&expired_task).await.unwrap();

        fixture
            .service
            .lock(live.id, &UserId::new("u2"))
            .await
            .unwrap();

        let released = fixture.service.clean_expired_locks().await.unwrap();
        assert_eq!(released, 1);

        let still_locked = fixture.tasks.get(live.id).await.unwrap().unwrap();
        assert!(still_locked.lock_owner.is_some());

        // A second sweep is a no-op.
        assert_eq!(fixture.service.clean_expired_locks().await.unwrap(), 0);
    }
}
