use thiserror::Error;

/// Core error type for the Flowgate runtime
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// No identity was supplied with the call
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Identity lacks the required claim or does not own the resource
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unknown id, or a foreign resource whose existence is masked
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation on an already finished or aborted resource
    #[error("Gone: {0}")]
    Gone(String),

    /// Operation by a worker that does not hold the lock
    #[error("Locked: {0}")]
    Locked(String),

    /// Malformed input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Duplicate resource on create
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Transition not allowed from the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// State store error
    #[error("State store error: {0}")]
    StateStoreError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl CoreError {
    /// Stable machine-readable code for the error kind
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Unauthenticated(_) => "UNAUTHENTICATED",
            CoreError::Forbidden(_) => "FORBIDDEN",
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::Gone(_) => "GONE",
            CoreError::Locked(_) => "LOCKED",
            CoreError::BadRequest(_) => "BAD_REQUEST",
            CoreError::Conflict(_) => "CONFLICT",
            CoreError::InvalidState(_) => "INVALID_STATE",
            CoreError::StateStoreError(_) => "STATE_STORE_ERROR",
            CoreError::SerializationError(_) => "SERIALIZATION_ERROR",
        }
    }

    /// The message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            CoreError::Unauthenticated(msg)
            | CoreError::Forbidden(msg)
            | CoreError::NotFound(msg)
            | CoreError::Gone(msg)
            | CoreError::Locked(msg)
            | CoreError::BadRequest(msg)
            | CoreError::Conflict(msg)
            | CoreError::InvalidState(msg)
            | CoreError::StateStoreError(msg)
            | CoreError::SerializationError(msg) => msg,
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}
