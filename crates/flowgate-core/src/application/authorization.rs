//! Ownership and claim checks
//!
//! The gate itself is a port so deployments can ask an external identity
//! service. The helpers at the bottom of this module apply the query rules
//! shared by every service: list queries drop foreign items and fail
//! `Forbidden` only when everything they found is foreign, single lookups
//! fail `Forbidden` or `NotFound` depending on whether existence may leak.

use crate::domain::identity::Identity;
use crate::CoreError;
use async_trait::async_trait;
use tracing::debug;

/// Default claim that bypasses ownership comparison
pub const DEFAULT_SUPER_ADMIN_CLAIM: &str = "can_manage_all";

/// Default claim required to work the external task queue
pub const DEFAULT_EXTERNAL_TASK_CLAIM: &str = "can_access_external_tasks";

/// Capability and ownership checks consumed by every service
#[async_trait]
pub trait AuthorizationGate: Send + Sync {
    /// Fail `Unauthenticated` when the identity carries no token
    async fn ensure_authenticated(&self, identity: &Identity) -> Result<(), CoreError> {
        if identity.is_authenticated() {
            Ok(())
        } else {
            Err(CoreError::Unauthenticated(
                "No identity was supplied".to_string(),
            ))
        }
    }

    /// Whether `identity` may see or act on a resource owned by `owner`
    async fn can_access(&self, identity: &Identity, owner: &Identity) -> Result<bool, CoreError>;

    /// Whether `identity` holds the super-admin role
    async fn is_super_admin(&self, identity: &Identity) -> Result<bool, CoreError>;

    /// Require the capability to fetch and complete external tasks
    async fn ensure_external_task_access(&self, identity: &Identity) -> Result<(), CoreError>;

    /// Require the super-admin role
    async fn ensure_super_admin(&self, identity: &Identity) -> Result<(), CoreError> {
        self.ensure_authenticated(identity).await?;
        if self.is_super_admin(identity).await? {
            Ok(())
        } else {
            Err(CoreError::Forbidden(format!(
                "User {} is not a super admin",
                identity.user_id
            )))
        }
    }
}

/// Gate driven by claims on the identity itself
#[derive(Debug, Clone)]
pub struct ClaimBasedAuthorizationGate {
    super_admin_claim: String,
    external_task_claim: String,
}

impl ClaimBasedAuthorizationGate {
    /// Create a gate with custom claim names
    pub fn new(super_admin_claim: impl Into<String>, external_task_claim: impl Into<String>) -> Self {
        Self {
            super_admin_claim: super_admin_claim.into(),
            external_task_claim: external_task_claim.into(),
        }
    }

    pub fn super_admin_claim(&self) -> &str {
        &self.super_admin_claim
    }

    pub fn external_task_claim(&self) -> &str {
        &self.external_task_claim
    }
}

impl Default for ClaimBasedAuthorizationGate {
    fn default() -> Self {
        Self::new(DEFAULT_SUPER_ADMIN_CLAIM, DEFAULT_EXTERNAL_TASK_CLAIM)
    }
}

#[async_trait]
impl AuthorizationGate for ClaimBasedAuthorizationGate {
    async fn can_access(&self, identity: &Identity, owner: &Identity) -> Result<bool, CoreError> {
        Ok(identity.has_claim(&self.super_admin_claim) || identity.is_same_user(owner))
    }

    async fn is_super_admin(&self, identity: &Identity) -> Result<bool, CoreError> {
        Ok(identity.has_claim(&self.super_admin_claim))
    }

    async fn ensure_external_task_access(&self, identity: &Identity) -> Result<(), CoreError> {
        self.ensure_authenticated(identity).await?;
        if identity.has_claim(&self.external_task_claim) || identity.has_claim(&self.super_admin_claim)
        {
            Ok(())
        } else {
            debug!(user_id = %identity.user_id, claim = %self.external_task_claim, "Missing claim");
            Err(CoreError::Forbidden(format!(
                "User {} lacks claim {}",
                identity.user_id, self.external_task_claim
            )))
        }
    }
}

/// How a single-resource lookup reports a foreign owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignAccess {
    /// Report `Forbidden`
    Forbid,
    /// Report `NotFound` so existence is not confirmed
    Mask,
}

/// Check access to one resource
pub async fn ensure_can_access(
    gate: &dyn AuthorizationGate,
    identity: &Identity,
    owner: &Identity,
    resource: &str,
    foreign: ForeignAccess,
) -> Result<(), CoreError> {
    gate.ensure_authenticated(identity).await?;
    if gate.can_access(identity, owner).await? {
        return Ok(());
    }
    match foreign {
        ForeignAccess::Forbid => Err(CoreError::Forbidden(format!(
            "Access to {} denied",
            resource
        ))),
        ForeignAccess::Mask => Err(CoreError::NotFound(format!("{} not found", resource))),
    }
}

/// Drop items the caller cannot access
///
/// Fails `Forbidden` if `items` is non-empty and every item is foreign.
pub async fn filter_accessible<T, F>(
    gate: &dyn AuthorizationGate,
    identity: &Identity,
    items: Vec<T>,
    owner_of: F,
) -> Result<Vec<T>, CoreError>
where
    T: Send,
    F: Fn(&T) -> &Identity + Send + Sync,
{
    gate.ensure_authenticated(identity).await?;
    if items.is_empty() {
        return Ok(items);
    }

    let mut accessible = Vec::with_capacity(items.len());
    for item in items {
        if gate.can_access(identity, owner_of(&item)).await? {
            accessible.push(item);
        }
    }

    if accessible.is_empty() {
        return Err(CoreError::Forbidden(format!(
            "User {} may not access any of the requested items",
            identity.user_id
        )));
    }
    Ok(accessible)
}
