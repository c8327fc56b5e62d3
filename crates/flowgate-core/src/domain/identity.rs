use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A verified caller
///
/// Produced by the identity verifier at the edge of the system. The
/// core never inspects the token beyond checking that one is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Bearer token the identity was resolved from; never written out
    #[serde(skip_serializing, default)]
    pub token: String,

    /// Stable user id used for ownership comparison
    pub user_id: String,

    /// Claims granted to the identity
    #[serde(default)]
    pub claims: BTreeSet<String>,
}

impl Identity {
    /// Create a new identity without claims
    pub fn new(token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user_id: user_id.into(),
            claims: BTreeSet::new(),
        }
    }

    /// An identity with no token
    pub fn anonymous() -> Self {
        Self::new("", "")
    }

    /// Add a claim
    pub fn with_claim(mut self, claim: impl Into<String>) -> Self {
        self.claims.insert(claim.into());
        self
    }

    /// Whether a token is present
    pub fn is_authenticated(&self) -> bool {
        !self.token.is_empty()
    }

    /// Whether the identity carries the claim
    pub fn has_claim(&self, claim: &str) -> bool {
        self.claims.contains(claim)
    }

    /// Whether both identities belong to the same user
    pub fn is_same_user(&self, other: &Identity) -> bool {
        !self.user_id.is_empty() && self.user_id == other.user_id
    }
}
