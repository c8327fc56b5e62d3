// Flowgate Tests
//
// This is a meta-package that organizes the test structure.
// Scenario tests live in the integrations package.

#[cfg(feature = "integrations")]
pub use flowgate_integration_tests as integrations;
