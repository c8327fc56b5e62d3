//! PostgreSQL state store implementation for the Flowgate runtime
//!
//! This crate provides PostgreSQL implementations of the repository
//! ports defined in flowgate-core. External task reservation relies on
//! row-level locks (`FOR UPDATE SKIP LOCKED`), so several runtime
//! processes may share one database.

use std::sync::Arc;

use flowgate_core::{CoreError, RuntimeRepositories};
use tracing::info;

pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{PostgresConfig, PostgresConnection};
pub use repositories::{
    PostgresExternalTaskRepository, PostgresFlowNodeInstanceRepository,
    PostgresProcessInstanceRepository, PostgresTokenHistoryRepository,
};

/// Provider for PostgreSQL state store repositories
#[derive(Clone)]
pub struct PostgresStateStoreProvider {
    connection: PostgresConnection,
}

impl PostgresStateStoreProvider {
    /// Connect with default pool settings
    pub async fn new(connection_string: &str) -> Result<Self, CoreError> {
        let config = PostgresConfig {
            connection_string: connection_string.to_string(),
            ..PostgresConfig::default()
        };
        Self::with_config(config).await
    }

    /// Connect with custom configuration
    pub async fn with_config(config: PostgresConfig) -> Result<Self, CoreError> {
        let connection = PostgresConnection::new(&config).await?;
        info!(
            max_connections = config.max_connections,
            "PostgreSQL state store ready"
        );
        Ok(Self { connection })
    }

    /// Wrap an already established connection
    pub fn from_connection(connection: PostgresConnection) -> Self {
        Self { connection }
    }

    /// Create repositories for use with RuntimeInterface
    pub fn create_repositories(&self) -> RuntimeRepositories {
        RuntimeRepositories {
            process_instances: Arc::new(PostgresProcessInstanceRepository::new(
                self.connection.clone(),
            )),
            flow_node_instances: Arc::new(PostgresFlowNodeInstanceRepository::new(
                self.connection.clone(),
            )),
            external_tasks: Arc::new(PostgresExternalTaskRepository::new(
                self.connection.clone(),
            )),
            token_history: Arc::new(PostgresTokenHistoryRepository::new(
                self.connection.clone(),
            )),
        }
    }

    /// Underlying connection
    pub fn connection(&self) -> &PostgresConnection {
        &self.connection
    }
}
