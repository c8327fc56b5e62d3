//! Callers used across tests.
//!
//! Claim names match the defaults of `ClaimBasedAuthorizationGate`.

use flowgate_core::application::authorization::{
    DEFAULT_EXTERNAL_TASK_CLAIM, DEFAULT_SUPER_ADMIN_CLAIM,
};
use flowgate_core::Identity;

/// Ordinary user that may also work the external task queue
pub fn default_user() -> Identity {
    Identity::new("default-token", "defaultUser").with_claim(DEFAULT_EXTERNAL_TASK_CLAIM)
}

/// A second user without any claims
pub fn restricted_user() -> Identity {
    Identity::new("restricted-token", "restrictedUser")
}

/// Sees and manages everything
pub fn super_admin() -> Identity {
    Identity::new("admin-token", "superAdmin").with_claim(DEFAULT_SUPER_ADMIN_CLAIM)
}

/// External worker with queue access and no ownership of processes
pub fn worker(user_id: &str) -> Identity {
    Identity::new(format!("{user_id}-token"), user_id).with_claim(DEFAULT_EXTERNAL_TASK_CLAIM)
}
