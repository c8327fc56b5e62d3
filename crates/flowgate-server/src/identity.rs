//! Bearer token to identity resolution

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use flowgate_core::{CoreError, Identity};
use std::collections::HashMap;

use crate::error::{ServerError, ServerResult};

/// Turns a bearer token into an identity
///
/// Unknown tokens fail `Unauthenticated`. Requests without a token never
/// reach the resolver; they carry the anonymous identity and the
/// authorization gate rejects them.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Identity, CoreError>;
}

/// Extract the bearer token from the `Authorization` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolve the caller of a request
pub async fn identify(
    resolver: &dyn IdentityResolver,
    headers: &HeaderMap,
) -> Result<Identity, CoreError> {
    match bearer_token(headers) {
        Some(token) => resolver.resolve(token).await,
        None => Ok(Identity::anonymous()),
    }
}

/// Resolver over a fixed token table
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityResolver {
    identities: HashMap<String, Identity>,
}

impl StaticIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an identity under its own token
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identities.insert(identity.token.clone(), identity);
        self
    }

    /// Parse `token=user:claim|claim;token2=user2`
    pub fn parse(table: &str) -> ServerResult<Self> {
        let mut resolver = Self::new();
        for entry in table.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (token, rest) = entry.split_once('=').ok_or_else(|| {
                ServerError::ConfigError(format!("Identity entry '{}' lacks '='", entry))
            })?;
            let (user_id, claims) = match rest.split_once(':') {
                Some((user_id, claims)) => (user_id, claims),
                None => (rest, ""),
            };
            let (token, user_id) = (token.trim(), user_id.trim());
            if token.is_empty() || user_id.is_empty() {
                return Err(ServerError::ConfigError(format!(
                    "Identity entry '{}' needs a token and a user id",
                    entry
                )));
            }

            let identity = claims
                .split('|')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .fold(Identity::new(token, user_id), |identity, claim| {
                    identity.with_claim(claim)
                });
            resolver = resolver.with_identity(identity);
        }
        Ok(resolver)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn resolve(&self, token: &str) -> Result<Identity, CoreError> {
        self.identities
            .get(token)
            .cloned()
            .ok_or_else(|| CoreError::Unauthenticated("Unknown bearer token".to_string()))
    }
}
