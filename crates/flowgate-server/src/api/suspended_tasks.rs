//! Suspended flow node instance queries and manual completion

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use flowgate_core::{
    CorrelationId, FlowNodeId, FlowNodeInstance, FlowNodeInstanceId, Page, Pagination,
    ProcessInstanceId, ProcessModelId, SuspendedTaskQuery, TokenPayload,
};
use serde::Deserialize;
use std::sync::Arc;

use super::errors::ApiError;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct FinishSuspendedTaskRequest {
    #[serde(default)]
    pub result: serde_json::Value,
}

async fn suspended(
    state: &AppState,
    headers: &HeaderMap,
    query: SuspendedTaskQuery,
    pagination: Pagination,
) -> Result<Json<Page<FlowNodeInstance>>, ApiError> {
    let identity = state.caller(headers).await?;
    let page = state
        .runtime
        .flow_nodes()
        .get_suspended_tasks(&identity, &query, pagination)
        .await?;
    Ok(Json(page))
}

/// `GET /v1/correlations/:correlation_id/suspended_tasks`
pub async fn by_correlation(
    State(state): State<Arc<AppState>>,
    Path(correlation_id): Path<String>,
    Query(pagination): Query<Pagination>,
    headers: HeaderMap,
) -> Result<Json<Page<FlowNodeInstance>>, ApiError> {
    let query = SuspendedTaskQuery::ByCorrelation(CorrelationId::from(correlation_id));
    suspended(&state, &headers, query, pagination).await
}

/// `GET /v1/process_models/:process_model_id/suspended_tasks`
pub async fn by_process_model(
    State(state): State<Arc<AppState>>,
    Path(process_model_id): Path<String>,
    Query(pagination): Query<Pagination>,
    headers: HeaderMap,
) -> Result<Json<Page<FlowNodeInstance>>, ApiError> {
    let query = SuspendedTaskQuery::ByProcessModel(ProcessModelId::from(process_model_id));
    suspended(&state, &headers, query, pagination).await
}

/// `GET /v1/process_instances/:process_instance_id/suspended_tasks`
pub async fn by_process_instance(
    State(state): State<Arc<AppState>>,
    Path(process_instance_id): Path<String>,
    Query(pagination): Query<Pagination>,
    headers: HeaderMap,
) -> Result<Json<Page<FlowNodeInstance>>, ApiError> {
    let query =
        SuspendedTaskQuery::ByProcessInstance(ProcessInstanceId::from(process_instance_id));
    suspended(&state, &headers, query, pagination).await
}

/// `GET /v1/flow_nodes/:flow_node_id/suspended_tasks`
pub async fn by_flow_node(
    State(state): State<Arc<AppState>>,
    Path(flow_node_id): Path<String>,
    Query(pagination): Query<Pagination>,
    headers: HeaderMap,
) -> Result<Json<Page<FlowNodeInstance>>, ApiError> {
    let query = SuspendedTaskQuery::ByFlowNode(FlowNodeId::from(flow_node_id));
    suspended(&state, &headers, query, pagination).await
}

/// `GET /v1/suspended_tasks`, the caller's own tasks
pub async fn by_identity(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<Pagination>,
    headers: HeaderMap,
) -> Result<Json<Page<FlowNodeInstance>>, ApiError> {
    suspended(&state, &headers, SuspendedTaskQuery::ByIdentity, pagination).await
}

/// `GET /v1/flow_node_instances/:flow_node_instance_id`
pub async fn get_flow_node_instance(
    State(state): State<Arc<AppState>>,
    Path(flow_node_instance_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<FlowNodeInstance>, ApiError> {
    let identity = state.caller(&headers).await?;
    let instance = state
        .runtime
        .flow_nodes()
        .get(&identity, &FlowNodeInstanceId::from(flow_node_instance_id))
        .await?;
    Ok(Json(instance))
}

/// `POST /v1/flow_node_instances/:flow_node_instance_id/finish`
pub async fn finish_suspended_task(
    State(state): State<Arc<AppState>>,
    Path(flow_node_instance_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<FinishSuspendedTaskRequest>,
) -> Result<Json<FlowNodeInstance>, ApiError> {
    let identity = state.caller(&headers).await?;
    let instance = state
        .runtime
        .flow_nodes()
        .finish_suspended_task(
            &identity,
            &FlowNodeInstanceId::from(flow_node_instance_id),
            TokenPayload::new(body.result),
        )
        .await?;
    Ok(Json(instance))
}
