//! Structured logging module using tracing.
//!
//! JSON output is meant for log aggregation in production, pretty
//! output for local development.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::MonitoringConfig;

/// Build the filter: `RUST_LOG` wins, otherwise the configured filter
pub fn env_filter(config: &MonitoringConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter))
}

/// Initialize structured logging
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &MonitoringConfig) -> anyhow::Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    if config.json_logs {
        let json_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);
        registry
            .with(json_layer)
            .try_init()
            .context("Failed to set global default subscriber")?;
    } else {
        let fmt_layer = fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);
        registry
            .with(fmt_layer)
            .try_init()
            .context("Failed to set global default subscriber")?;
    }

    info!(
        service_name = %config.service_name,
        environment = %config.environment,
        log_format = if config.json_logs { "json" } else { "pretty" },
        "Logging initialized"
    );
    Ok(())
}

/// Trait to add log context to results
pub trait LogExt<T, E> {
    /// Log error with additional context before returning
    fn log_err(self, message: &str) -> Result<T, E>;

    /// Log success with additional context before returning
    fn log_ok(self, message: &str) -> Result<T, E>;
}

impl<T, E: std::fmt::Display> LogExt<T, E> for Result<T, E> {
    fn log_err(self, message: &str) -> Result<T, E> {
        if let Err(ref e) = self {
            tracing::error!("{}: {}", message, e);
        }
        self
    }

    fn log_ok(self, message: &str) -> Result<T, E> {
        if self.is_ok() {
            tracing::info!("{}", message);
        }
        self
    }
}
