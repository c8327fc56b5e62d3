//! Token history and active token endpoints

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use flowgate_core::{
    ActiveToken, CorrelationId, FlowNodeId, ProcessInstanceId, ProcessModelId, TokenHistoryGroup,
};
use std::sync::Arc;

use super::errors::ApiError;
use crate::server::AppState;

/// `GET /v1/correlations/:correlation_id/process_models/:process_model_id/flow_nodes/:flow_node_id/token_history`
pub async fn for_flow_node(
    State(state): State<Arc<AppState>>,
    Path((correlation_id, process_model_id, flow_node_id)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Json<TokenHistoryGroup>, ApiError> {
    let identity = state.caller(&headers).await?;
    let group = state
        .runtime
        .token_history()
        .get_tokens_for_flow_node(
            &identity,
            &CorrelationId::from(correlation_id),
            &ProcessModelId::from(process_model_id),
            &FlowNodeId::from(flow_node_id),
        )
        .await?;
    Ok(Json(group))
}

/// `GET /v1/process_instances/:process_instance_id/flow_nodes/:flow_node_id/token_history`
pub async fn for_flow_node_in_process_instance(
    State(state): State<Arc<AppState>>,
    Path((process_instance_id, flow_node_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<TokenHistoryGroup>, ApiError> {
    let identity = state.caller(&headers).await?;
    let group = state
        .runtime
        .token_history()
        .get_tokens_for_flow_node_in_process_instance(
            &identity,
            &ProcessInstanceId::from(process_instance_id),
            &FlowNodeId::from(flow_node_id),
        )
        .await?;
    Ok(Json(group))
}

/// `GET /v1/process_instances/:process_instance_id/token_history`
pub async fn for_process_instance(
    State(state): State<Arc<AppState>>,
    Path(process_instance_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TokenHistoryGroup>, ApiError> {
    let identity = state.caller(&headers).await?;
    let group = state
        .runtime
        .token_history()
        .get_tokens_for_process_instance(&identity, &ProcessInstanceId::from(process_instance_id))
        .await?;
    Ok(Json(group))
}

/// `GET /v1/correlations/:correlation_id/process_models/:process_model_id/token_history`
pub async fn for_correlation_and_process_model(
    State(state): State<Arc<AppState>>,
    Path((correlation_id, process_model_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<TokenHistoryGroup>, ApiError> {
    let identity = state.caller(&headers).await?;
    let group = state
        .runtime
        .token_history()
        .get_tokens_for_correlation_and_process_model(
            &identity,
            &CorrelationId::from(correlation_id),
            &ProcessModelId::from(process_model_id),
        )
        .await?;
    Ok(Json(group))
}

/// `GET /v1/flow_nodes/:flow_node_id/active_tokens`
pub async fn active_for_flow_node(
    State(state): State<Arc<AppState>>,
    Path(flow_node_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<ActiveToken>>, ApiError> {
    let identity = state.caller(&headers).await?;
    let tokens = state
        .runtime
        .token_history()
        .get_active_tokens_for_flow_node(&identity, &FlowNodeId::from(flow_node_id))
        .await?;
    Ok(Json(tokens))
}

/// `GET /v1/process_instances/:process_instance_id/active_tokens`
pub async fn active_for_process_instance(
    State(state): State<Arc<AppState>>,
    Path(process_instance_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<ActiveToken>>, ApiError> {
    let identity = state.caller(&headers).await?;
    let tokens = state
        .runtime
        .token_history()
        .get_active_tokens_for_process_instance(
            &identity,
            &ProcessInstanceId::from(process_instance_id),
        )
        .await?;
    Ok(Json(tokens))
}

/// `GET /v1/correlations/:correlation_id/process_models/:process_model_id/active_tokens`
pub async fn active_for_correlation_and_process_model(
    State(state): State<Arc<AppState>>,
    Path((correlation_id, process_model_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Vec<ActiveToken>>, ApiError> {
    let identity = state.caller(&headers).await?;
    let tokens = state
        .runtime
        .token_history()
        .get_active_tokens_for_correlation_and_process_model(
            &identity,
            &CorrelationId::from(correlation_id),
            &ProcessModelId::from(process_model_id),
        )
        .await?;
    Ok(Json(tokens))
}

/// `GET /v1/process_models/:process_model_id/active_tokens`
pub async fn active_for_process_model(
    State(state): State<Arc<AppState>>,
    Path(process_model_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<ActiveToken>>, ApiError> {
    let identity = state.caller(&headers).await?;
    let tokens = state
        .runtime
        .token_history()
        .get_active_tokens_for_process_model(&identity, &ProcessModelId::from(process_model_id))
        .await?;
    Ok(Json(tokens))
}
