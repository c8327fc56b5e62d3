use flowgate_core::CoreError;
use thiserror::Error;

/// Error types for the test utilities
#[derive(Debug, Error)]
pub enum TestError {
    /// Runtime call failed
    #[error("Runtime error: {0}")]
    Core(#[from] CoreError),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Test setup failed
    #[error("Test setup failed: {0}")]
    TestSetupFailed(String),
}
