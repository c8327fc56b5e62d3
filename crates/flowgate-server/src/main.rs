use anyhow::{Context, Result};
use flowgate_monitoring::MonitoringConfig;
use flowgate_server::config::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // LOG_LEVEL and LOG_JSON are read again by ServerConfig::load below;
    // logging has to exist before the config loader warns about anything
    let monitoring_config = MonitoringConfig {
        service_name: "flowgate-server".to_string(),
        log_filter: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        json_logs: std::env::var("LOG_JSON")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false),
        environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
    };

    flowgate_monitoring::init_logging(&monitoring_config)
        .context("Failed to initialize logging")?;

    // Load configuration from environment variables
    let config = ServerConfig::load().context("Failed to load configuration")?;

    // Run the server using the library's run function
    flowgate_server::run(config).await.context("Server error")?;

    Ok(())
}
