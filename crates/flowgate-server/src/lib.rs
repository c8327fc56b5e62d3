//!
//! Flowgate Server - HTTP surface of the Flowgate process runtime
//!
//! This module exports all the components of the Flowgate Server.

use std::sync::Arc;

use flowgate_core::{
    ChannelEventPublisher, ClaimBasedAuthorizationGate, RuntimeInterface, RuntimeRepositories,
};
use flowgate_state_inmemory::InMemoryStateStoreProvider;
use tracing::info;

/// API module
pub mod api;

/// Server module
pub mod server;

/// Configuration module
pub mod config;

/// Error module
pub mod error;

/// Identity resolution module
pub mod identity;

// Re-export key types
pub use config::{ServerConfig, StorageBackend};
pub use error::{ServerError, ServerResult};
pub use identity::{IdentityResolver, StaticIdentityResolver};
pub use server::{AppState, FlowgateServer};

/// Run function
pub async fn run(config: ServerConfig) -> ServerResult<()> {
    let server = create_server(config).await?;
    server.run().await
}

/// Wire storage, authorization and identity resolution from configuration
pub async fn create_server(config: ServerConfig) -> ServerResult<FlowgateServer> {
    let backend = config.storage_backend()?;
    let repositories = create_repositories(&config, &backend).await?;

    let runtime = RuntimeInterface::builder(repositories)
        .with_authorization_gate(Arc::new(ClaimBasedAuthorizationGate::new(
            config.super_admin_claim.clone(),
            config.external_task_claim.clone(),
        )))
        .with_publisher(Arc::new(ChannelEventPublisher::new()))
        .build();

    let identities = StaticIdentityResolver::parse(&config.identities)?;
    info!(identities = identities.len(), "Loaded static identities");

    let state = AppState::new(runtime, Arc::new(identities), backend.name());
    Ok(FlowgateServer::new(config, state))
}

async fn create_repositories(
    config: &ServerConfig,
    backend: &StorageBackend,
) -> ServerResult<RuntimeRepositories> {
    match backend {
        StorageBackend::Memory => {
            info!("Using in-memory state store");
            Ok(InMemoryStateStoreProvider::new().create_repositories())
        }
        #[cfg(feature = "postgres")]
        StorageBackend::Postgres(url) => {
            info!("Using PostgreSQL state store");
            let pg_config = flowgate_state_postgres::PostgresConfig {
                connection_string: url.clone(),
                max_connections: config.postgres_max_connections,
                ..flowgate_state_postgres::PostgresConfig::default()
            };
            let provider =
                flowgate_state_postgres::PostgresStateStoreProvider::with_config(pg_config).await?;
            Ok(provider.create_repositories())
        }
        #[cfg(not(feature = "postgres"))]
        StorageBackend::Postgres(_) => {
            let _ = config;
            Err(ServerError::ConfigError(
                "PostgreSQL support is not compiled in".to_string(),
            ))
        }
    }
}
