//! Assertion utilities for validating Flowgate runtime state.
//!
//! Helpers return a `Result` so tests can `?` or `unwrap` them and get a
//! readable failure either way.

mod token_history;

pub use token_history::*;
