//! Error handling for the Flowgate Server API
//!
//! Every failure is rendered as
//! `{"error": ..., "errorDetails": {"errorCode": ..., "errorMessage": ...}}`.

use axum::{http::StatusCode, response::IntoResponse, Json};
use flowgate_core::CoreError;
use serde_json::json;
use tracing::error;

use crate::error::ServerError;

/// API Error type for returning standard error responses
#[derive(Debug)]
pub struct ApiError(pub ServerError);

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        ApiError(err)
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(ServerError::Core(err))
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// HTTP status for a runtime error
pub fn status_for(err: &CoreError) -> StatusCode {
    match err {
        CoreError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
        CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::Gone(_) => StatusCode::GONE,
        CoreError::Locked(_) => StatusCode::LOCKED,
        CoreError::BadRequest(_) => StatusCode::BAD_REQUEST,
        CoreError::Conflict(_) | CoreError::InvalidState(_) => StatusCode::CONFLICT,
        CoreError::StateStoreError(_) | CoreError::SerializationError(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_code, message) = match &self.0 {
            ServerError::Core(err) => (status_for(err), err.code(), err.message().to_string()),
            ServerError::ConfigError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                msg.clone(),
            ),
            ServerError::InternalError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                msg.clone(),
            ),
        };

        if status.is_server_error() {
            error!(error_code, error = %message, "Request failed");
        }

        let body = Json(json!({
            "error": self.0.to_string(),
            "errorDetails": {
                "errorCode": error_code,
                "errorMessage": message,
            }
        }));

        (status, body).into_response()
    }
}
