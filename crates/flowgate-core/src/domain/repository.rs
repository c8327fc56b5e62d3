//! Repository traits for the Flowgate runtime
//!
//! Stores hold entities by value and reference other entities only by
//! id. Every mutation after create is a compare-and-set against the state
//! the caller loaded: a store returns `Ok(false)` when another writer got
//! there first, and the service reloads to report the precise error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::external_task::{ExternalTask, ExternalTaskState, LockRequest};
use super::flow_node_instance::{FlowNodeInstance, FlowNodeInstanceFilter, FlowNodeInstanceState};
use super::ids::{
    CorrelationId, ExternalTaskId, FlowNodeInstanceId, ProcessInstanceId, ProcessModelId,
};
use super::process_instance::{ProcessInstance, ProcessInstanceState};
use super::token_history::{TokenHistoryEntry, TokenHistoryQuery};
use crate::CoreError;

/// Repository for process instances
#[async_trait]
pub trait ProcessInstanceRepository: Send + Sync {
    /// Insert a new instance; `Conflict` if the id exists
    async fn create(&self, instance: &ProcessInstance) -> Result<(), CoreError>;

    /// Find a process instance by ID
    async fn find_by_id(
        &self,
        id: &ProcessInstanceId,
    ) -> Result<Option<ProcessInstance>, CoreError>;

    /// Find all instances of a correlation, oldest first
    async fn find_by_correlation(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<Vec<ProcessInstance>, CoreError>;

    /// Find all instances of a process model, oldest first
    async fn find_by_process_model(
        &self,
        process_model_id: &ProcessModelId,
    ) -> Result<Vec<ProcessInstance>, CoreError>;

    /// Replace the stored instance if its state is still `expected`
    async fn save_if_state(
        &self,
        instance: &ProcessInstance,
        expected: ProcessInstanceState,
    ) -> Result<bool, CoreError>;
}

/// Repository for flow node instances
#[async_trait]
pub trait FlowNodeInstanceRepository: Send + Sync {
    /// Insert a new instance; `Conflict` if the id exists
    async fn create(&self, instance: &FlowNodeInstance) -> Result<(), CoreError>;

    /// Find a flow node instance by ID
    async fn find_by_id(
        &self,
        id: &FlowNodeInstanceId,
    ) -> Result<Option<FlowNodeInstance>, CoreError>;

    /// Find instances matching a filter, ordered by creation time then id
    async fn find(&self, filter: &FlowNodeInstanceFilter)
        -> Result<Vec<FlowNodeInstance>, CoreError>;

    /// Replace the stored instance if its state is still `expected`
    async fn save_if_state(
        &self,
        instance: &FlowNodeInstance,
        expected: FlowNodeInstanceState,
    ) -> Result<bool, CoreError>;
}

/// Repository for external tasks
#[async_trait]
pub trait ExternalTaskRepository: Send + Sync {
    /// Insert a new pending task; `Conflict` if the id exists
    async fn create(&self, task: &ExternalTask) -> Result<(), CoreError>;

    /// Find an external task by ID
    async fn find_by_id(&self, id: &ExternalTaskId) -> Result<Option<ExternalTask>, CoreError>;

    /// Find the task owned by a flow node instance
    async fn find_by_flow_node_instance(
        &self,
        flow_node_instance_id: &FlowNodeInstanceId,
    ) -> Result<Option<ExternalTask>, CoreError>;

    /// Atomically lock up to `max_tasks` pending tasks of the topic
    ///
    /// Candidates are ordered by creation time then id and the first
    /// `offset` are skipped. Concurrent callers never receive the same task.
    async fn fetch_and_lock(
        &self,
        request: &LockRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExternalTask>, CoreError>;

    /// Replace the stored task if its state and lock holder still match
    async fn save_if_unchanged(
        &self,
        task: &ExternalTask,
        expected_state: ExternalTaskState,
        expected_worker_id: Option<&str>,
    ) -> Result<bool, CoreError>;

    /// Return every locked task whose lease ended at or before `now` to pending
    async fn reclaim_expired(&self, now: DateTime<Utc>) -> Result<Vec<ExternalTask>, CoreError>;
}

/// Append-only token history store
#[async_trait]
pub trait TokenHistoryRepository: Send + Sync {
    /// Append an entry
    async fn append(&self, entry: &TokenHistoryEntry) -> Result<(), CoreError>;

    /// Entries in the slice, ordered by creation time then insertion order
    async fn find(&self, query: &TokenHistoryQuery) -> Result<Vec<TokenHistoryEntry>, CoreError>;
}
