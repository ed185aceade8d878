//! Repository for tasks.

use async_trait::async_trait;
use caseflow_core::{InstanceId, TaskId};
use caseflow_task::{Task, TaskError, TaskFilter, TaskStore};
use sqlx::{PgPool, Postgres, QueryBuilder};

fn storage_failed(e: sqlx::Error) -> TaskError {
    TaskError::StorageFailed {
        reason: e.to_string(),
    }
}

fn decode(reason: impl std::fmt::Display) -> TaskError {
    TaskError::StorageFailed {
        reason: reason.to_string(),
    }
}

/// Repository for tasks.
///
/// The full task is persisted as JSONB; scalar columns mirror the fields
/// listings filter on. The assignee filter also matches co-assignees via
/// JSONB containment on the payload.
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn decode_rows(rows: Vec<(serde_json::Value,)>) -> Result<Vec<Task>, TaskError> {
        rows.into_iter()
            .map(|(payload,)| serde_json::from_value(payload).map_err(decode))
            .collect()
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn create(&self, task: &Task) -> Result<(), TaskError> {
        let payload = serde_json::to_value(task).map_err(decode)?;
        sqlx::query(
            r#"
            INSERT INTO tasks
                (id, instance_id, node_id, kind, status, assignee, task, lock_owner, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(task.id.to_string())
        .bind(task.instance_id.to_string())
        .bind(&task.node_id)
        .bind(task.kind.as_str())
        .bind(task.status.as_str())
        .bind(task.assignee.as_ref().map(ToString::to_string))
        .bind(&payload)
        .bind(task.lock_owner.as_ref().map(ToString::to_string))
        .bind(task.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_failed)?;
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>, TaskError> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT task FROM tasks WHERE id = $1")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_failed)?;

        match row {
            Some((payload,)) => Ok(Some(serde_json::from_value(payload).map_err(decode)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, task: &Task) -> Result<(), TaskError> {
        let payload = serde_json::to_value(task).map_err(decode)?;
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = $2, assignee = $3, task = $4, lock_owner = $5
            WHERE id = $1
            "#,
        )
        .bind(task.id.to_string())
        .bind(task.status.as_str())
        .bind(task.assignee.as_ref().map(ToString::to_string))
        .bind(&payload)
        .bind(task.lock_owner.as_ref().map(ToString::to_string))
        .execute(&self.pool)
        .await
        .map_err(storage_failed)?;

        if result.rows_affected() == 0 {
            return Err(TaskError::NotFound { id: task.id });
        }
        Ok(())
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, TaskError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT task FROM tasks WHERE TRUE");

        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(kind) = filter.kind {
            builder.push(" AND kind = ").push_bind(kind.as_str());
        }
        if let Some(assignee) = &filter.assignee {
            builder
                .push(" AND (assignee = ")
                .push_bind(assignee.to_string())
                .push(" OR task->'co_assignees' @> to_jsonb(")
                .push_bind(assignee.to_string())
                .push("::text))");
        }
        if let Some(instance_id) = filter.instance_id {
            builder
                .push(" AND instance_id = ")
                .push_bind(instance_id.to_string());
        }

        builder.push(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = filter.limit {
            builder
                .push(" LIMIT ")
                .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        builder
            .push(" OFFSET ")
            .push_bind(i64::try_from(filter.offset).unwrap_or(0));

        let rows: Vec<(serde_json::Value,)> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(storage_failed)?;
        Self::decode_rows(rows)
    }

    async fn open_for_node(
        &self,
        instance_id: InstanceId,
        node_id: &str,
    ) -> Result<Vec<Task>, TaskError> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            r#"
            SELECT task
            FROM tasks
            WHERE instance_id = $1
              AND node_id = $2
              AND status IN ('pending', 'in_progress')
            "#,
        )
        .bind(instance_id.to_string())
        .bind(node_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_failed)?;
        Self::decode_rows(rows)
    }

    async fn list_locked(&self) -> Result<Vec<Task>, TaskError> {
        let rows: Vec<(serde_json::Value,)> =
            sqlx::query_as("SELECT task FROM tasks WHERE lock_owner IS NOT NULL")
                .fetch_all(&self.pool)
                .await
                .map_err(storage_failed)?;
        Self::decode_rows(rows)
    }
}
