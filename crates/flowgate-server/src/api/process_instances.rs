//! Process instance endpoints

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use flowgate_core::{
    CorrelationId, Page, Pagination, ProcessInstance, ProcessInstanceId, ProcessModelId,
    StartProcessInstance, TokenPayload,
};
use serde::Deserialize;
use std::sync::Arc;

use super::errors::ApiError;
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub start_token: serde_json::Value,
    pub parent_process_instance_id: Option<String>,
}

/// `POST /v1/process_models/:process_model_id/process_instances`
pub async fn start(
    State(state): State<Arc<AppState>>,
    Path(process_model_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<StartRequest>,
) -> Result<(StatusCode, Json<ProcessInstance>), ApiError> {
    let identity = state.caller(&headers).await?;
    let mut request =
        StartProcessInstance::new(process_model_id, TokenPayload::new(body.start_token));
    if let Some(correlation_id) = body.correlation_id {
        request = request.with_correlation(CorrelationId::from(correlation_id));
    }
    if let Some(parent) = body.parent_process_instance_id {
        request = request.with_parent(ProcessInstanceId::from(parent));
    }

    let instance = state
        .runtime
        .process_instances()
        .start(&identity, request)
        .await?;
    Ok((StatusCode::CREATED, Json(instance)))
}

/// `GET /v1/process_instances/:process_instance_id`
pub async fn get_by_id(
    State(state): State<Arc<AppState>>,
    Path(process_instance_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ProcessInstance>, ApiError> {
    let identity = state.caller(&headers).await?;
    let instance = state
        .runtime
        .process_instances()
        .get_by_id(&identity, &ProcessInstanceId::from(process_instance_id))
        .await?;
    Ok(Json(instance))
}

/// `GET /v1/correlations/:correlation_id/process_instances`
pub async fn get_by_correlation(
    State(state): State<Arc<AppState>>,
    Path(correlation_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<ProcessInstance>>, ApiError> {
    let identity = state.caller(&headers).await?;
    let instances = state
        .runtime
        .process_instances()
        .get_by_correlation(&identity, &CorrelationId::from(correlation_id))
        .await?;
    Ok(Json(instances))
}

/// `GET /v1/process_models/:process_model_id/process_instances`
pub async fn get_by_process_model(
    State(state): State<Arc<AppState>>,
    Path(process_model_id): Path<String>,
    Query(pagination): Query<Pagination>,
    headers: HeaderMap,
) -> Result<Json<Page<ProcessInstance>>, ApiError> {
    let identity = state.caller(&headers).await?;
    let page = state
        .runtime
        .process_instances()
        .get_by_process_model(&identity, &ProcessModelId::from(process_model_id), pagination)
        .await?;
    Ok(Json(page))
}

/// `POST /v1/process_instances/:process_instance_id/terminate`
pub async fn terminate(
    State(state): State<Arc<AppState>>,
    Path(process_instance_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ProcessInstance>, ApiError> {
    let identity = state.caller(&headers).await?;
    let instance = state
        .runtime
        .flow_nodes()
        .terminate(&identity, &ProcessInstanceId::from(process_instance_id))
        .await?;
    Ok(Json(instance))
}
