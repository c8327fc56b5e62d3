use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::postgres::{PgRow, Postgres};
use sqlx::{QueryBuilder, Row};
use tracing::debug;

use flowgate_core::{
    CoreError, CorrelationId, ExternalTask, ExternalTaskId, ExternalTaskRepository,
    ExternalTaskState, FlowNodeInstance, FlowNodeInstanceFilter, FlowNodeInstanceId,
    FlowNodeInstanceRepository, FlowNodeInstanceState, LockRequest, ProcessInstance,
    ProcessInstanceId, ProcessInstanceRepository, ProcessInstanceState, ProcessModelId,
    TokenHistoryEntry, TokenHistoryQuery, TokenHistoryRepository,
};

use crate::PostgresConnection;

fn db_error(context: &str) -> impl Fn(sqlx::Error) -> CoreError + '_ {
    move |e| {
        let unique_violation = e
            .as_database_error()
            .and_then(|db| db.code())
            .map_or(false, |code| code == "23505");
        if unique_violation {
            CoreError::Conflict(format!("{}: {}", context, e))
        } else {
            CoreError::StateStoreError(format!("{}: {}", context, e))
        }
    }
}

fn decode<T: DeserializeOwned>(row: &PgRow) -> Result<T, CoreError> {
    let data: serde_json::Value = row
        .try_get("data")
        .map_err(|e| CoreError::SerializationError(format!("Error getting data: {}", e)))?;
    Ok(serde_json::from_value(data)?)
}

fn decode_all<T: DeserializeOwned>(rows: &[PgRow]) -> Result<Vec<T>, CoreError> {
    rows.iter().map(decode).collect()
}

/// Postgres implementation of the ProcessInstanceRepository
#[derive(Clone)]
pub struct PostgresProcessInstanceRepository {
    conn: PostgresConnection,
}

impl PostgresProcessInstanceRepository {
    /// Create a new Postgres process instance repository
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ProcessInstanceRepository for PostgresProcessInstanceRepository {
    async fn create(&self, instance: &ProcessInstance) -> Result<(), CoreError> {
        let data = serde_json::to_value(instance)?;
        sqlx::query(
            "
            INSERT INTO process_instances
                (id, process_model_id, correlation_id, state, data, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(instance.id.as_str())
        .bind(instance.process_model_id.as_str())
        .bind(instance.correlation_id.as_str())
        .bind(instance.state.as_str())
        .bind(&data)
        .bind(instance.created_at)
        .bind(instance.updated_at)
        .execute(self.conn.pool())
        .await
        .map_err(db_error("Failed to create process instance"))?;
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &ProcessInstanceId,
    ) -> Result<Option<ProcessInstance>, CoreError> {
        let row = sqlx::query("SELECT data FROM process_instances WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(self.conn.pool())
            .await
            .map_err(db_error("Failed to load process instance"))?;
        row.as_ref().map(decode).transpose()
    }

    async fn find_by_correlation(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<Vec<ProcessInstance>, CoreError> {
        let rows = sqlx::query(
            "SELECT data FROM process_instances WHERE correlation_id = $1 ORDER BY created_at, id",
        )
        .bind(correlation_id.as_str())
        .fetch_all(self.conn.pool())
        .await
        .map_err(db_error("Failed to query process instances"))?;
        decode_all(&rows)
    }

    async fn find_by_process_model(
        &self,
        process_model_id: &ProcessModelId,
    ) -> Result<Vec<ProcessInstance>, CoreError> {
        let rows = sqlx::query(
            "SELECT data FROM process_instances WHERE process_model_id = $1 ORDER BY created_at, id",
        )
        .bind(process_model_id.as_str())
        .fetch_all(self.conn.pool())
        .await
        .map_err(db_error("Failed to query process instances"))?;
        decode_all(&rows)
    }

    async fn save_if_state(
        &self,
        instance: &ProcessInstance,
        expected: ProcessInstanceState,
    ) -> Result<bool, CoreError> {
        let data = serde_json::to_value(instance)?;
        let result = sqlx::query(
            "
            UPDATE process_instances
            SET state = $2, data = $3, updated_at = $4
            WHERE id = $1 AND state = $5
            ",
        )
        .bind(instance.id.as_str())
        .bind(instance.state.as_str())
        .bind(&data)
        .bind(instance.updated_at)
        .bind(expected.as_str())
        .execute(self.conn.pool())
        .await
        .map_err(db_error("Failed to save process instance"))?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        match self.find_by_id(&instance.id).await? {
            Some(_) => Ok(false),
            None => Err(CoreError::NotFound(format!(
                "Process instance {} not found",
                instance.id
            ))),
        }
    }
}

/// Postgres implementation of the FlowNodeInstanceRepository
#[derive(Clone)]
pub struct PostgresFlowNodeInstanceRepository {
    conn: PostgresConnection,
}

impl PostgresFlowNodeInstanceRepository {
    /// Create a new Postgres flow node instance repository
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl FlowNodeInstanceRepository for PostgresFlowNodeInstanceRepository {
    async fn create(&self, instance: &FlowNodeInstance) -> Result<(), CoreError> {
        let data = serde_json::to_value(instance)?;
        sqlx::query(
            "
            INSERT INTO flow_node_instances
                (id, flow_node_id, flow_node_type, process_instance_id, process_model_id,
                 correlation_id, owner_user_id, state, data, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
        )
        .bind(instance.id.as_str())
        .bind(instance.flow_node_id.as_str())
        .bind(instance.flow_node_type.as_str())
        .bind(instance.process_instance_id.as_str())
        .bind(instance.process_model_id.as_str())
        .bind(instance.correlation_id.as_str())
        .bind(instance.owner.user_id.as_str())
        .bind(instance.state.as_str())
        .bind(&data)
        .bind(instance.created_at)
        .bind(instance.updated_at)
        .execute(self.conn.pool())
        .await
        .map_err(db_error("Failed to create flow node instance"))?;
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &FlowNodeInstanceId,
    ) -> Result<Option<FlowNodeInstance>, CoreError> {
        let row = sqlx::query("SELECT data FROM flow_node_instances WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(self.conn.pool())
            .await
            .map_err(db_error("Failed to load flow node instance"))?;
        row.as_ref().map(decode).transpose()
    }

    async fn find(
        &self,
        filter: &FlowNodeInstanceFilter,
    ) -> Result<Vec<FlowNodeInstance>, CoreError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT data FROM flow_node_instances WHERE TRUE");
        if let Some(state) = filter.state {
            qb.push(" AND state = ").push_bind(state.as_str());
        }
        if let Some(flow_node_type) = filter.flow_node_type {
            qb.push(" AND flow_node_type = ").push_bind(flow_node_type.as_str());
        }
        if let Some(id) = &filter.process_instance_id {
            qb.push(" AND process_instance_id = ").push_bind(id.as_str().to_string());
        }
        if let Some(id) = &filter.process_model_id {
            qb.push(" AND process_model_id = ").push_bind(id.as_str().to_string());
        }
        if let Some(id) = &filter.correlation_id {
            qb.push(" AND correlation_id = ").push_bind(id.as_str().to_string());
        }
        if let Some(id) = &filter.flow_node_id {
            qb.push(" AND flow_node_id = ").push_bind(id.as_str().to_string());
        }
        if let Some(user_id) = &filter.owner_user_id {
            qb.push(" AND owner_user_id = ").push_bind(user_id.clone());
        }
        qb.push(" ORDER BY created_at, id");

        let rows = qb
            .build()
            .fetch_all(self.conn.pool())
            .await
            .map_err(db_error("Failed to query flow node instances"))?;
        decode_all(&rows)
    }

    async fn save_if_state(
        &self,
        instance: &FlowNodeInstance,
        expected: FlowNodeInstanceState,
    ) -> Result<bool, CoreError> {
        let data = serde_json::to_value(instance)?;
        let result = sqlx::query(
            "
            UPDATE flow_node_instances
            SET state = $2, data = $3, updated_at = $4
            WHERE id = $1 AND state = $5
            ",
        )
        .bind(instance.id.as_str())
        .bind(instance.state.as_str())
        .bind(&data)
        .bind(instance.updated_at)
        .bind(expected.as_str())
        .execute(self.conn.pool())
        .await
        .map_err(db_error("Failed to save flow node instance"))?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        match self.find_by_id(&instance.id).await? {
            Some(_) => Ok(false),
            None => Err(CoreError::NotFound(format!(
                "Flow node instance {} not found",
                instance.id
            ))),
        }
    }
}

/// Postgres implementation of the ExternalTaskRepository
///
/// Reservation selects candidates with `FOR UPDATE SKIP LOCKED` so
/// concurrent pollers each claim a disjoint set of rows.
#[derive(Clone)]
pub struct PostgresExternalTaskRepository {
    conn: PostgresConnection,
}

impl PostgresExternalTaskRepository {
    /// Create a new Postgres external task repository
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }
}

const UPDATE_EXTERNAL_TASK: &str = "
    UPDATE external_tasks
    SET state = $2, worker_id = $3, lock_expiration_time = $4, data = $5
    WHERE id = $1
";

#[async_trait]
impl ExternalTaskRepository for PostgresExternalTaskRepository {
    async fn create(&self, task: &ExternalTask) -> Result<(), CoreError> {
        let data = serde_json::to_value(task)?;
        sqlx::query(
            "
            INSERT INTO external_tasks
                (id, flow_node_instance_id, process_instance_id, topic, state,
                 worker_id, lock_expiration_time, data, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(task.id.as_str())
        .bind(task.flow_node_instance_id.as_str())
        .bind(task.process_instance_id.as_str())
        .bind(&task.topic)
        .bind(task.state.as_str())
        .bind(task.worker_id.as_deref())
        .bind(task.lock_expiration_time)
        .bind(&data)
        .bind(task.created_at)
        .execute(self.conn.pool())
        .await
        .map_err(db_error("Failed to create external task"))?;
        Ok(())
    }

    async fn find_by_id(&self, id: &ExternalTaskId) -> Result<Option<ExternalTask>, CoreError> {
        let row = sqlx::query("SELECT data FROM external_tasks WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(self.conn.pool())
            .await
            .map_err(db_error("Failed to load external task"))?;
        row.as_ref().map(decode).transpose()
    }

    async fn find_by_flow_node_instance(
        &self,
        flow_node_instance_id: &FlowNodeInstanceId,
    ) -> Result<Option<ExternalTask>, CoreError> {
        let row = sqlx::query("SELECT data FROM external_tasks WHERE flow_node_instance_id = $1")
            .bind(flow_node_instance_id.as_str())
            .fetch_optional(self.conn.pool())
            .await
            .map_err(db_error("Failed to load external task"))?;
        row.as_ref().map(decode).transpose()
    }

    async fn fetch_and_lock(
        &self,
        request: &LockRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExternalTask>, CoreError> {
        let mut tx = self
            .conn
            .pool()
            .begin()
            .await
            .map_err(db_error("Failed to start transaction"))?;

        let rows = sqlx::query(
            "
            SELECT data FROM external_tasks
            WHERE state = 'pending' AND topic = $1
            ORDER BY created_at, id
            OFFSET $2
            LIMIT $3
            FOR UPDATE SKIP LOCKED
            ",
        )
        .bind(&request.topic)
        .bind(i64::try_from(request.offset).unwrap_or(i64::MAX))
        .bind(i64::try_from(request.max_tasks).unwrap_or(i64::MAX))
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error("Failed to select pending external tasks"))?;

        let mut locked = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut task: ExternalTask = decode(row)?;
            task.lock(&request.worker_id, request.lock_duration, now)?;
            let data = serde_json::to_value(&task)?;
            sqlx::query(UPDATE_EXTERNAL_TASK)
                .bind(task.id.as_str())
                .bind(task.state.as_str())
                .bind(task.worker_id.as_deref())
                .bind(task.lock_expiration_time)
                .bind(&data)
                .execute(&mut *tx)
                .await
                .map_err(db_error("Failed to lock external task"))?;
            locked.push(task);
        }

        tx.commit()
            .await
            .map_err(db_error("Failed to commit external task locks"))?;

        debug!(
            worker_id = %request.worker_id,
            topic = %request.topic,
            locked = locked.len(),
            "Locked pending tasks"
        );
        Ok(locked)
    }

    async fn save_if_unchanged(
        &self,
        task: &ExternalTask,
        expected_state: ExternalTaskState,
        expected_worker_id: Option<&str>,
    ) -> Result<bool, CoreError> {
        let data = serde_json::to_value(task)?;
        let result = sqlx::query(
            "
            UPDATE external_tasks
            SET state = $2, worker_id = $3, lock_expiration_time = $4, data = $5
            WHERE id = $1 AND state = $6 AND worker_id IS NOT DISTINCT FROM $7
            ",
        )
        .bind(task.id.as_str())
        .bind(task.state.as_str())
        .bind(task.worker_id.as_deref())
        .bind(task.lock_expiration_time)
        .bind(&data)
        .bind(expected_state.as_str())
        .bind(expected_worker_id)
        .execute(self.conn.pool())
        .await
        .map_err(db_error("Failed to save external task"))?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        match self.find_by_id(&task.id).await? {
            Some(_) => Ok(false),
            None => Err(CoreError::NotFound(format!(
                "External task {} not found",
                task.id
            ))),
        }
    }

    async fn reclaim_expired(&self, now: DateTime<Utc>) -> Result<Vec<ExternalTask>, CoreError> {
        let mut tx = self
            .conn
            .pool()
            .begin()
            .await
            .map_err(db_error("Failed to start transaction"))?;

        let rows = sqlx::query(
            "
            SELECT data FROM external_tasks
            WHERE state = 'locked' AND lock_expiration_time <= $1
            ORDER BY created_at, id
            FOR UPDATE SKIP LOCKED
            ",
        )
        .bind(now)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error("Failed to select expired external tasks"))?;

        let mut reclaimed = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut task: ExternalTask = decode(row)?;
            if !task.release_expired_lock(now) {
                continue;
            }
            let data = serde_json::to_value(&task)?;
            sqlx::query(UPDATE_EXTERNAL_TASK)
                .bind(task.id.as_str())
                .bind(task.state.as_str())
                .bind(task.worker_id.as_deref())
                .bind(task.lock_expiration_time)
                .bind(&data)
                .execute(&mut *tx)
                .await
                .map_err(db_error("Failed to reclaim external task"))?;
            reclaimed.push(task);
        }

        tx.commit()
            .await
            .map_err(db_error("Failed to commit reclaimed locks"))?;
        Ok(reclaimed)
    }
}

/// Postgres implementation of the TokenHistoryRepository
#[derive(Clone)]
pub struct PostgresTokenHistoryRepository {
    conn: PostgresConnection,
}

impl PostgresTokenHistoryRepository {
    /// Create a new Postgres token history repository
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl TokenHistoryRepository for PostgresTokenHistoryRepository {
    async fn append(&self, entry: &TokenHistoryEntry) -> Result<(), CoreError> {
        let data = serde_json::to_value(entry)?;
        sqlx::query(
            "
            INSERT INTO token_history
                (flow_node_instance_id, flow_node_id, token_event_type, process_instance_id,
                 process_model_id, correlation_id, data, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(entry.flow_node_instance_id.as_str())
        .bind(entry.flow_node_id.as_str())
        .bind(entry.token_event_type.as_str())
        .bind(entry.process_instance_id.as_str())
        .bind(entry.process_model_id.as_str())
        .bind(entry.correlation_id.as_str())
        .bind(&data)
        .bind(entry.created_at)
        .execute(self.conn.pool())
        .await
        .map_err(db_error("Failed to append token history entry"))?;
        Ok(())
    }

    async fn find(&self, query: &TokenHistoryQuery) -> Result<Vec<TokenHistoryEntry>, CoreError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT data FROM token_history WHERE ");
        match query {
            TokenHistoryQuery::FlowNodeInCorrelation {
                correlation_id,
                process_model_id,
                flow_node_id,
            } => {
                qb.push("correlation_id = ")
                    .push_bind(correlation_id.as_str().to_string())
                    .push(" AND process_model_id = ")
                    .push_bind(process_model_id.as_str().to_string())
                    .push(" AND flow_node_id = ")
                    .push_bind(flow_node_id.as_str().to_string());
            }
            TokenHistoryQuery::FlowNodeInProcessInstance {
                process_instance_id,
                flow_node_id,
            } => {
                qb.push("process_instance_id = ")
                    .push_bind(process_instance_id.as_str().to_string())
                    .push(" AND flow_node_id = ")
                    .push_bind(flow_node_id.as_str().to_string());
            }
            TokenHistoryQuery::ProcessInstance(process_instance_id) => {
                qb.push("process_instance_id = ")
                    .push_bind(process_instance_id.as_str().to_string());
            }
            TokenHistoryQuery::CorrelationAndProcessModel {
                correlation_id,
                process_model_id,
            } => {
                qb.push("correlation_id = ")
                    .push_bind(correlation_id.as_str().to_string())
                    .push(" AND process_model_id = ")
                    .push_bind(process_model_id.as_str().to_string());
            }
        }
        qb.push(" ORDER BY created_at, seq");

        let rows = qb
            .build()
            .fetch_all(self.conn.pool())
            .await
            .map_err(db_error("Failed to query token history"))?;
        decode_all(&rows)
    }
}
