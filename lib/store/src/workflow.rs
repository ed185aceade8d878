//! Repositories for definitions, instances, history, and timers.

use async_trait::async_trait;
use caseflow_core::{DefinitionId, InstanceId, TimerId};
use caseflow_workflow::definition::{DefinitionSummary, WorkflowDefinition};
use caseflow_workflow::error::StoreError;
use caseflow_workflow::history::HistoryEntry;
use caseflow_workflow::instance::WorkflowInstance;
use caseflow_workflow::store::{DefinitionStore, HistoryStore, InstanceStore};
use caseflow_workflow::timer::{TimerRecord, TimerStore};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable {
        reason: e.to_string(),
    }
}

fn decode(reason: impl std::fmt::Display) -> StoreError {
    StoreError::Decode {
        reason: reason.to_string(),
    }
}

/// Repository for workflow definitions.
pub struct PgDefinitionStore {
    pool: PgPool,
}

impl PgDefinitionStore {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct DefinitionSummaryRow {
    id: String,
    name: String,
    description: Option<String>,
    active: bool,
    node_count: i64,
    updated_at: DateTime<Utc>,
}

impl DefinitionSummaryRow {
    fn try_into_summary(self) -> Result<DefinitionSummary, StoreError> {
        let id = DefinitionId::from_str(&self.id)
            .map_err(|e| decode(format!("invalid definition id '{}': {}", self.id, e)))?;
        Ok(DefinitionSummary {
            id,
            name: self.name,
            description: self.description,
            active: self.active,
            node_count: usize::try_from(self.node_count).unwrap_or(0),
            updated_at: self.updated_at,
        })
    }
}

#[async_trait]
impl DefinitionStore for PgDefinitionStore {
    async fn create(&self, definition: &WorkflowDefinition) -> Result<(), StoreError> {
        let payload = serde_json::to_value(definition).map_err(decode)?;
        sqlx::query(
            r#"
            INSERT INTO workflow_definitions
                (id, name, active, definition, node_count, description, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(definition.id.to_string())
        .bind(definition.name())
        .bind(definition.is_active())
        .bind(&payload)
        .bind(i64::try_from(definition.graph.node_count()).unwrap_or(0))
        .bind(&definition.metadata.description)
        .bind(definition.metadata.updated_at)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn get(&self, id: DefinitionId) -> Result<Option<WorkflowDefinition>, StoreError> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT definition FROM workflow_definitions WHERE id = $1")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(unavailable)?;

        match row {
            Some((payload,)) => Ok(Some(serde_json::from_value(payload).map_err(decode)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, definition: &WorkflowDefinition) -> Result<(), StoreError> {
        let payload = serde_json::to_value(definition).map_err(decode)?;
        sqlx::query(
            r#"
            UPDATE workflow_definitions
            SET name = $2, active = $3, definition = $4, node_count = $5,
                description = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(definition.id.to_string())
        .bind(definition.name())
        .bind(definition.is_active())
        .bind(&payload)
        .bind(i64::try_from(definition.graph.node_count()).unwrap_or(0))
        .bind(&definition.metadata.description)
        .bind(definition.metadata.updated_at)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn list_summaries(&self) -> Result<Vec<DefinitionSummary>, StoreError> {
        let rows: Vec<DefinitionSummaryRow> = sqlx::query_as(
            r#"
            SELECT id, name, description, active, node_count, updated_at
            FROM workflow_definitions
            ORDER BY updated_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.into_iter().map(|r| r.try_into_summary()).collect()
    }
}

/// Repository for workflow instances.
pub struct PgInstanceStore {
    pool: PgPool,
}

impl PgInstanceStore {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InstanceStore for PgInstanceStore {
    async fn create(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        let payload = serde_json::to_value(instance).map_err(decode)?;
        sqlx::query(
            r#"
            INSERT INTO workflow_instances (id, definition_id, status, instance, started_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(instance.id.to_string())
        .bind(instance.definition_id.to_string())
        .bind(instance.status.as_str())
        .bind(&payload)
        .bind(instance.started_at)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn get(&self, id: InstanceId) -> Result<Option<WorkflowInstance>, StoreError> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT instance FROM workflow_instances WHERE id = $1")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(unavailable)?;

        match row {
            Some((payload,)) => Ok(Some(serde_json::from_value(payload).map_err(decode)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        let payload = serde_json::to_value(instance).map_err(decode)?;
        sqlx::query(
            r#"
            UPDATE workflow_instances
            SET status = $2, instance = $3
            WHERE id = $1
            "#,
        )
        .bind(instance.id.to_string())
        .bind(instance.status.as_str())
        .bind(&payload)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<WorkflowInstance>, StoreError> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            r#"
            SELECT instance
            FROM workflow_instances
            WHERE status IN ('pending', 'running')
            ORDER BY started_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.into_iter()
            .map(|(payload,)| serde_json::from_value(payload).map_err(decode))
            .collect()
    }
}

/// Repository for the append-only history log.
pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn append(&self, entry: &HistoryEntry) -> Result<(), StoreError> {
        let payload = serde_json::to_value(entry).map_err(decode)?;
        sqlx::query(
            r#"
            INSERT INTO instance_history (id, instance_id, entry, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.instance_id.to_string())
        .bind(&payload)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn list_for_instance(&self, id: InstanceId) -> Result<Vec<HistoryEntry>, StoreError> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            r#"
            SELECT entry
            FROM instance_history
            WHERE instance_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.into_iter()
            .map(|(payload,)| serde_json::from_value(payload).map_err(decode))
            .collect()
    }
}

/// Repository for durable timers.
pub struct PgTimerStore {
    pool: PgPool,
}

impl PgTimerStore {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct TimerRow {
    id: String,
    instance_id: String,
    due_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TimerRow {
    fn try_into_record(self) -> Result<TimerRecord, StoreError> {
        let id = TimerId::from_str(&self.id)
            .map_err(|e| decode(format!("invalid timer id '{}': {}", self.id, e)))?;
        let instance_id = InstanceId::from_str(&self.instance_id)
            .map_err(|e| decode(format!("invalid instance id '{}': {}", self.instance_id, e)))?;
        Ok(TimerRecord {
            id,
            instance_id,
            due_at: self.due_at,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl TimerStore for PgTimerStore {
    async fn schedule(&self, record: &TimerRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO instance_timers (id, instance_id, due_at, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.instance_id.to_string())
        .bind(record.due_at)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<TimerRecord>, StoreError> {
        // DELETE ... RETURNING makes the claim atomic: concurrent sweeps
        // never fire the same record twice.
        let rows: Vec<TimerRow> = sqlx::query_as(
            r#"
            DELETE FROM instance_timers
            WHERE due_at <= $1
            RETURNING id, instance_id, due_at, created_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        let mut records: Vec<TimerRecord> = rows
            .into_iter()
            .map(|r| r.try_into_record())
            .collect::<Result<_, _>>()?;
        records.sort_by_key(|r| r.due_at);
        Ok(records)
    }

    async fn pending(&self) -> Result<Vec<TimerRecord>, StoreError> {
        let rows: Vec<TimerRow> = sqlx::query_as(
            r#"
            SELECT id, instance_id, due_at, created_at
            FROM instance_timers
            ORDER BY due_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.into_iter().map(|r| r.try_into_record()).collect()
    }
}
