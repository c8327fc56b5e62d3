//! Configuration for the Flowgate Server
//!
//! Every setting comes from an environment variable. Malformed numbers
//! are reported and replaced by their default; an unsupported storage
//! URL is rejected.

use serde::{Deserialize, Serialize};
use std::env;
use tracing::{info, warn};

use flowgate_core::application::authorization::{
    DEFAULT_EXTERNAL_TASK_CLAIM, DEFAULT_SUPER_ADMIN_CLAIM,
};

use crate::error::{ServerError, ServerResult};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub bind_address: String,

    /// `memory://...` or `postgres://...`
    #[serde(default = "default_storage_url")]
    pub storage_url: String,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Claim granting the super-admin role
    #[serde(default = "default_super_admin_claim")]
    pub super_admin_claim: String,

    /// Claim granting access to the external task queue
    #[serde(default = "default_external_task_claim")]
    pub external_task_claim: String,

    /// Static token table, `token=user:claim|claim;...`
    #[serde(default)]
    pub identities: String,

    /// Pool size for the PostgreSQL store
    #[serde(default = "default_postgres_max_connections")]
    pub postgres_max_connections: u32,
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_storage_url() -> String {
    "memory://local".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_super_admin_claim() -> String {
    DEFAULT_SUPER_ADMIN_CLAIM.to_string()
}

fn default_external_task_claim() -> String {
    DEFAULT_EXTERNAL_TASK_CLAIM.to_string()
}

fn default_postgres_max_connections() -> u32 {
    5
}

/// Storage backend selected by `storage_url`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres(String),
}

impl StorageBackend {
    /// Short name reported by the health endpoint
    pub fn name(&self) -> &'static str {
        match self {
            StorageBackend::Memory => "memory",
            StorageBackend::Postgres(_) => "postgres",
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn load() -> ServerResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> ServerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = lookup("SERVER_PORT") {
            match port.parse::<u16>() {
                Ok(port) => config.port = port,
                Err(_) => warn!("Invalid SERVER_PORT value: {}", port),
            }
        }

        if let Some(host) = lookup("SERVER_HOST") {
            config.bind_address = host;
        }

        if let Some(storage_url) = lookup("STORAGE_URL") {
            config.storage_url = storage_url;
        }

        if let Some(log_level) = lookup("LOG_LEVEL") {
            config.log_level = log_level;
        }

        if let Some(log_json) = lookup("LOG_JSON") {
            config.log_json = log_json.eq_ignore_ascii_case("true") || log_json == "1";
        }

        if let Some(claim) = lookup("SUPER_ADMIN_CLAIM") {
            config.super_admin_claim = claim;
        }

        if let Some(claim) = lookup("EXTERNAL_TASK_CLAIM") {
            config.external_task_claim = claim;
        }

        if let Some(identities) = lookup("IDENTITIES") {
            config.identities = identities;
        }

        if let Some(max) = lookup("POSTGRES_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(max) if max > 0 => config.postgres_max_connections = max,
                _ => warn!("Invalid POSTGRES_MAX_CONNECTIONS value: {}", max),
            }
        }

        config.storage_backend()?;

        if config.identities.trim().is_empty() {
            warn!("No IDENTITIES provided - every request will be unauthenticated!");
        }

        info!(storage = %config.storage_url, port = config.port, "Loaded server configuration");
        Ok(config)
    }

    /// Parse the storage URL
    pub fn storage_backend(&self) -> ServerResult<StorageBackend> {
        let url = self.storage_url.trim();
        if url.starts_with("memory://") {
            Ok(StorageBackend::Memory)
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(StorageBackend::Postgres(url.to_string()))
        } else {
            Err(ServerError::ConfigError(format!(
                "Unsupported storage URL: {}",
                self.storage_url
            )))
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_host(),
            storage_url: default_storage_url(),
            log_level: default_log_level(),
            log_json: false,
            super_admin_claim: default_super_admin_claim(),
            external_task_claim: default_external_task_claim(),
            identities: String::new(),
            postgres_max_connections: default_postgres_max_connections(),
        }
    }
}
