//! Builders for test runtimes.

mod test_runtime;

pub use test_runtime::*;
