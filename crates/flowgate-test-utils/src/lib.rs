//! Testing utilities for the Flowgate process runtime.
//!
//! This crate provides identity fixtures, a controllable clock, mock and
//! fake routing engines, a runtime builder over the in-memory state store
//! and assertions on the token history ledger.

pub mod assertions;
pub mod builders;
pub mod error;
pub mod fixtures;
pub mod mocks;

/// Re-export commonly used types for convenience
pub use mockall;

pub use builders::{TestRuntime, TestRuntimeBuilder};
pub use error::TestError;
pub use fixtures::clock::ManualClock;
pub use mocks::routing::{MockRoutingEngine, StaticRoutingEngine};

/// Install a test subscriber once; later calls are no-ops
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
