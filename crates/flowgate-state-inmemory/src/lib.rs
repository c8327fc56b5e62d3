//! In-memory state store implementation for the Flowgate runtime
//!
//! This crate provides in-memory implementations of the repository
//! ports defined in flowgate-core. It is the default backend for
//! development and for every test suite in the workspace.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod repositories;
pub use repositories::{
    InMemoryExternalTaskRepository, InMemoryFlowNodeInstanceRepository,
    InMemoryProcessInstanceRepository, InMemoryTokenHistoryRepository,
};

use flowgate_core::{
    ExternalTask, ExternalTaskId, FlowNodeInstance, FlowNodeInstanceId, ProcessInstance,
    ProcessInstanceId, RuntimeRepositories, TokenHistoryEntry,
};

/// Provider for in-memory state store repositories
///
/// Repositories created from the same provider share storage.
#[derive(Default)]
pub struct InMemoryStateStoreProvider {
    process_instances: Arc<RwLock<HashMap<ProcessInstanceId, ProcessInstance>>>,
    flow_node_instances: Arc<RwLock<HashMap<FlowNodeInstanceId, FlowNodeInstance>>>,
    external_tasks: Arc<RwLock<HashMap<ExternalTaskId, ExternalTask>>>,
    token_history: Arc<RwLock<Vec<TokenHistoryEntry>>>,
}

impl InMemoryStateStoreProvider {
    /// Create a new in-memory state store provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Create repositories for use with RuntimeInterface
    pub fn create_repositories(&self) -> RuntimeRepositories {
        RuntimeRepositories {
            process_instances: Arc::new(InMemoryProcessInstanceRepository::new(
                self.process_instances.clone(),
            )),
            flow_node_instances: Arc::new(InMemoryFlowNodeInstanceRepository::new(
                self.flow_node_instances.clone(),
            )),
            external_tasks: Arc::new(InMemoryExternalTaskRepository::new(
                self.external_tasks.clone(),
            )),
            token_history: Arc::new(InMemoryTokenHistoryRepository::new(
                self.token_history.clone(),
            )),
        }
    }
}
