//! Health check endpoint for the Flowgate Server

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::server::AppState;

/// Health check handler
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("Health check requested");
    (
        StatusCode::OK,
        Json(json!({
            "status": "UP",
            "version": env!("CARGO_PKG_VERSION"),
            "storage": state.storage,
        })),
    )
}
