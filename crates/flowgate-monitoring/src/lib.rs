//! Monitoring module for the Flowgate runtime.
//!
//! Logging goes through `tracing`; metrics are emitted as structured
//! log events so any log pipeline can aggregate them.

use serde::{Deserialize, Serialize};

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogExt};
pub use metrics::{QueueMetrics, QueueOutcome};

/// Configuration for initializing the monitoring system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Service name attached to the startup event
    pub service_name: String,
    /// Log level filter used when `RUST_LOG` is unset (e.g. "info,flowgate_core=debug")
    pub log_filter: String,
    /// Emit JSON lines instead of pretty output
    pub json_logs: bool,
    /// Environment (dev, staging, prod)
    pub environment: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            service_name: "flowgate".to_string(),
            log_filter: "info".to_string(),
            json_logs: false,
            environment: "dev".to_string(),
        }
    }
}

impl MonitoringConfig {
    pub fn with_log_filter(mut self, log_filter: impl Into<String>) -> Self {
        self.log_filter = log_filter.into();
        self
    }

    pub fn with_json_logs(mut self, json_logs: bool) -> Self {
        self.json_logs = json_logs;
        self
    }
}
