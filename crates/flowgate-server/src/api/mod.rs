//! API module for the Flowgate Server
//!
//! Callers authenticate with `Authorization: Bearer <token>`.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod errors;
pub mod external_tasks;
pub mod health;
pub mod process_instances;
pub mod suspended_tasks;
pub mod token_history;

use crate::server::AppState;

/// Build the router for API endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // External task queue
        .route("/v1/fetch_and_lock", post(external_tasks::fetch_and_lock))
        .route(
            "/v1/external_tasks/:external_task_id",
            get(external_tasks::get_external_task),
        )
        .route(
            "/v1/external_tasks/:external_task_id/extend_lock",
            post(external_tasks::extend_lock),
        )
        .route(
            "/v1/external_tasks/:external_task_id/finish",
            post(external_tasks::finish),
        )
        .route(
            "/v1/external_tasks/:external_task_id/handle_bpmn_error",
            post(external_tasks::handle_bpmn_error),
        )
        .route(
            "/v1/external_tasks/:external_task_id/handle_service_error",
            post(external_tasks::handle_service_error),
        )
        .route(
            "/v1/admin/reclaim_expired_locks",
            post(external_tasks::reclaim_expired_locks),
        )
        // Process instances
        .route(
            "/v1/process_models/:process_model_id/process_instances",
            post(process_instances::start).get(process_instances::get_by_process_model),
        )
        .route(
            "/v1/process_instances/:process_instance_id",
            get(process_instances::get_by_id),
        )
        .route(
            "/v1/process_instances/:process_instance_id/terminate",
            post(process_instances::terminate),
        )
        .route(
            "/v1/correlations/:correlation_id/process_instances",
            get(process_instances::get_by_correlation),
        )
        // Suspended tasks
        .route("/v1/suspended_tasks", get(suspended_tasks::by_identity))
        .route(
            "/v1/correlations/:correlation_id/suspended_tasks",
            get(suspended_tasks::by_correlation),
        )
        .route(
            "/v1/process_models/:process_model_id/suspended_tasks",
            get(suspended_tasks::by_process_model),
        )
        .route(
            "/v1/process_instances/:process_instance_id/suspended_tasks",
            get(suspended_tasks::by_process_instance),
        )
        .route(
            "/v1/flow_nodes/:flow_node_id/suspended_tasks",
            get(suspended_tasks::by_flow_node),
        )
        .route(
            "/v1/flow_node_instances/:flow_node_instance_id",
            get(suspended_tasks::get_flow_node_instance),
        )
        .route(
            "/v1/flow_node_instances/:flow_node_instance_id/finish",
            post(suspended_tasks::finish_suspended_task),
        )
        // Token history
        .route(
            "/v1/correlations/:correlation_id/process_models/:process_model_id/flow_nodes/:flow_node_id/token_history",
            get(token_history::for_flow_node),
        )
        .route(
            "/v1/process_instances/:process_instance_id/flow_nodes/:flow_node_id/token_history",
            get(token_history::for_flow_node_in_process_instance),
        )
        .route(
            "/v1/process_instances/:process_instance_id/token_history",
            get(token_history::for_process_instance),
        )
        .route(
            "/v1/correlations/:correlation_id/process_models/:process_model_id/token_history",
            get(token_history::for_correlation_and_process_model),
        )
        // Active tokens
        .route(
            "/v1/flow_nodes/:flow_node_id/active_tokens",
            get(token_history::active_for_flow_node),
        )
        .route(
            "/v1/process_instances/:process_instance_id/active_tokens",
            get(token_history::active_for_process_instance),
        )
        .route(
            "/v1/correlations/:correlation_id/process_models/:process_model_id/active_tokens",
            get(token_history::active_for_correlation_and_process_model),
        )
        .route(
            "/v1/process_models/:process_model_id/active_tokens",
            get(token_history::active_for_process_model),
        )
        // Health check
        .route("/health", get(health::health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
