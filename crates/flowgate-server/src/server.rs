//! Main Flowgate Server implementation

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderMap;
use flowgate_core::{CoreError, Identity, RuntimeInterface};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::identity::{identify, IdentityResolver};

/// State shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub runtime: RuntimeInterface,
    pub identities: Arc<dyn IdentityResolver>,
    /// Storage backend name reported by `/health`
    pub storage: &'static str,
}

impl AppState {
    pub fn new(
        runtime: RuntimeInterface,
        identities: Arc<dyn IdentityResolver>,
        storage: &'static str,
    ) -> Self {
        Self {
            runtime,
            identities,
            storage,
        }
    }

    /// Resolve the caller from the request headers
    pub async fn caller(&self, headers: &HeaderMap) -> Result<Identity, CoreError> {
        identify(self.identities.as_ref(), headers).await
    }
}

/// Main server implementation
#[derive(Clone)]
pub struct FlowgateServer {
    /// Configuration
    pub config: ServerConfig,
    state: Arc<AppState>,
}

impl std::fmt::Debug for FlowgateServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowgateServer")
            .field("config", &self.config)
            .field("storage", &self.state.storage)
            .finish()
    }
}

impl FlowgateServer {
    /// Create a new FlowgateServer
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    /// Shared handler state
    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Build the HTTP router without binding a socket
    pub fn router(&self) -> axum::Router {
        crate::api::build_router(self.state.clone())
    }

    /// Bind and serve until ctrl-c
    pub async fn run(self) -> ServerResult<()> {
        info!("Starting Flowgate Server");

        let app = self.router();
        let listener =
            TcpListener::bind((self.config.bind_address.as_str(), self.config.port)).await?;
        let addr: SocketAddr = listener.local_addr()?;
        info!("Listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Flowgate Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // no signal handler available; run until the process is killed
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
