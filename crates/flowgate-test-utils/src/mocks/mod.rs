//! Mock implementations of Flowgate ports.
//!
//! Mocks are generated with mockall for expectation-style tests; the
//! static fakes keep simple rules and record what they saw.

pub mod routing;

pub use routing::*;
