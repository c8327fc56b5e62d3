//! Fixtures shared by runtime tests.

pub mod clock;
pub mod identities;

pub use clock::ManualClock;
pub use identities::*;
