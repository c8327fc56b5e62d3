use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use flowgate_core::{
    CoreError, CorrelationId, ExternalTask, ExternalTaskId, ExternalTaskRepository,
    ExternalTaskState, FlowNodeInstance, FlowNodeInstanceFilter, FlowNodeInstanceId,
    FlowNodeInstanceRepository, FlowNodeInstanceState, LockRequest, ProcessInstance,
    ProcessInstanceId, ProcessInstanceRepository, ProcessInstanceState, ProcessModelId,
    TokenHistoryEntry, TokenHistoryQuery, TokenHistoryRepository,
};

/// In-memory implementation of the ProcessInstanceRepository
pub struct InMemoryProcessInstanceRepository {
    instances: Arc<RwLock<HashMap<ProcessInstanceId, ProcessInstance>>>,
}

impl InMemoryProcessInstanceRepository {
    /// Create a repository over shared storage
    pub fn new(instances: Arc<RwLock<HashMap<ProcessInstanceId, ProcessInstance>>>) -> Self {
        Self { instances }
    }

    async fn select<F>(&self, predicate: F) -> Vec<ProcessInstance>
    where
        F: Fn(&ProcessInstance) -> bool,
    {
        let instances = self.instances.read().await;
        let mut result: Vec<ProcessInstance> =
            instances.values().filter(|i| predicate(i)).cloned().collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        result
    }
}

#[async_trait]
impl ProcessInstanceRepository for InMemoryProcessInstanceRepository {
    async fn create(&self, instance: &ProcessInstance) -> Result<(), CoreError> {
        let mut instances = self.instances.write().await;
        if instances.contains_key(&instance.id) {
            return Err(CoreError::Conflict(format!(
                "Process instance {} already exists",
                instance.id
            )));
        }
        instances.insert(instance.id.clone(), instance.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &ProcessInstanceId,
    ) -> Result<Option<ProcessInstance>, CoreError> {
        let instances = self.instances.read().await;
        Ok(instances.get(id).cloned())
    }

    async fn find_by_correlation(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<Vec<ProcessInstance>, CoreError> {
        Ok(self.select(|i| &i.correlation_id == correlation_id).await)
    }

    async fn find_by_process_model(
        &self,
        process_model_id: &ProcessModelId,
    ) -> Result<Vec<ProcessInstance>, CoreError> {
        Ok(self.select(|i| &i.process_model_id == process_model_id).await)
    }

    async fn save_if_state(
        &self,
        instance: &ProcessInstance,
        expected: ProcessInstanceState,
    ) -> Result<bool, CoreError> {
        let mut instances = self.instances.write().await;
        match instances.get_mut(&instance.id) {
            Some(stored) if stored.state == expected => {
                *stored = instance.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(CoreError::NotFound(format!(
                "Process instance {} not found",
                instance.id
            ))),
        }
    }
}

/// In-memory implementation of the FlowNodeInstanceRepository
pub struct InMemoryFlowNodeInstanceRepository {
    instances: Arc<RwLock<HashMap<FlowNodeInstanceId, FlowNodeInstance>>>,
}

impl InMemoryFlowNodeInstanceRepository {
    /// Create a repository over shared storage
    pub fn new(instances: Arc<RwLock<HashMap<FlowNodeInstanceId, FlowNodeInstance>>>) -> Self {
        Self { instances }
    }
}

#[async_trait]
impl FlowNodeInstanceRepository for InMemoryFlowNodeInstanceRepository {
    async fn create(&self, instance: &FlowNodeInstance) -> Result<(), CoreError> {
        let mut instances = self.instances.write().await;
        if instances.contains_key(&instance.id) {
            return Err(CoreError::Conflict(format!(
                "Flow node instance {} already exists",
                instance.id
            )));
        }
        instances.insert(instance.id.clone(), instance.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &FlowNodeInstanceId,
    ) -> Result<Option<FlowNodeInstance>, CoreError> {
        let instances = self.instances.read().await;
        Ok(instances.get(id).cloned())
    }

    async fn find(
        &self,
        filter: &FlowNodeInstanceFilter,
    ) -> Result<Vec<FlowNodeInstance>, CoreError> {
        let instances = self.instances.read().await;
        let mut result: Vec<FlowNodeInstance> = instances
            .values()
            .filter(|instance| filter.matches(instance))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(result)
    }

    async fn save_if_state(
        &self,
        instance: &FlowNodeInstance,
        expected: FlowNodeInstanceState,
    ) -> Result<bool, CoreError> {
        let mut instances = self.instances.write().await;
        match instances.get_mut(&instance.id) {
            Some(stored) if stored.state == expected => {
                *stored = instance.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(CoreError::NotFound(format!(
                "Flow node instance {} not found",
                instance.id
            ))),
        }
    }
}

/// In-memory implementation of the ExternalTaskRepository
///
/// Every reservation runs under the write lock, which makes the
/// pending-to-locked transition a single-writer critical section.
pub struct InMemoryExternalTaskRepository {
    tasks: Arc<RwLock<HashMap<ExternalTaskId, ExternalTask>>>,
}

impl InMemoryExternalTaskRepository {
    /// Create a repository over shared storage
    pub fn new(tasks: Arc<RwLock<HashMap<ExternalTaskId, ExternalTask>>>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl ExternalTaskRepository for InMemoryExternalTaskRepository {
    async fn create(&self, task: &ExternalTask) -> Result<(), CoreError> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(CoreError::Conflict(format!(
                "External task {} already exists",
                task.id
            )));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &ExternalTaskId) -> Result<Option<ExternalTask>, CoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(id).cloned())
    }

    async fn find_by_flow_node_instance(
        &self,
        flow_node_instance_id: &FlowNodeInstanceId,
    ) -> Result<Option<ExternalTask>, CoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .values()
            .find(|task| &task.flow_node_instance_id == flow_node_instance_id)
            .cloned())
    }

    async fn fetch_and_lock(
        &self,
        request: &LockRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExternalTask>, CoreError> {
        let mut tasks = self.tasks.write().await;

        let mut candidates: Vec<(DateTime<Utc>, ExternalTaskId)> = tasks
            .values()
            .filter(|task| task.state == ExternalTaskState::Pending && task.topic == request.topic)
            .map(|task| (task.created_at, task.id.clone()))
            .collect();
        candidates.sort();

        // lock copies so a rejected lease leaves the store untouched
        let mut locked = Vec::new();
        for (_, id) in candidates
            .into_iter()
            .skip(request.offset)
            .take(request.max_tasks)
        {
            if let Some(task) = tasks.get(&id) {
                let mut task = task.clone();
                task.lock(&request.worker_id, request.lock_duration, now)?;
                locked.push(task);
            }
        }
        for task in &locked {
            tasks.insert(task.id.clone(), task.clone());
        }

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
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&task.id) {
            Some(stored)
                if stored.state == expected_state
                    && stored.worker_id.as_deref() == expected_worker_id =>
            {
                *stored = task.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(CoreError::NotFound(format!(
                "External task {} not found",
                task.id
            ))),
        }
    }

    async fn reclaim_expired(&self, now: DateTime<Utc>) -> Result<Vec<ExternalTask>, CoreError> {
        let mut tasks = self.tasks.write().await;
        let reclaimed: Vec<ExternalTask> = tasks
            .values_mut()
            .filter_map(|task| task.release_expired_lock(now).then(|| task.clone()))
            .collect();
        Ok(reclaimed)
    }
}

/// In-memory implementation of the TokenHistoryRepository
pub struct InMemoryTokenHistoryRepository {
    entries: Arc<RwLock<Vec<TokenHistoryEntry>>>,
}

impl InMemoryTokenHistoryRepository {
    /// Create a repository over shared storage
    pub fn new(entries: Arc<RwLock<Vec<TokenHistoryEntry>>>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl TokenHistoryRepository for InMemoryTokenHistoryRepository {
    async fn append(&self, entry: &TokenHistoryEntry) -> Result<(), CoreError> {
        let mut entries = self.entries.write().await;
        entries.push(entry.clone());
        Ok(())
    }

    async fn find(&self, query: &TokenHistoryQuery) -> Result<Vec<TokenHistoryEntry>, CoreError> {
        let entries = self.entries.read().await;
        let mut result: Vec<TokenHistoryEntry> = entries
            .iter()
            .filter(|entry| query.matches(entry))
            .cloned()
            .collect();
        // stable sort keeps insertion order for equal timestamps
        result.sort_by_key(|entry| entry.created_at);
        Ok(result)
    }
}
