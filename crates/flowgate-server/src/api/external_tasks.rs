//! External task queue endpoints used by workers

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use flowgate_core::{CoreError, ExternalTask, ExternalTaskId, LockRequest, TokenPayload};
use flowgate_monitoring::{QueueMetrics, QueueOutcome};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::errors::ApiError;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchAndLockRequest {
    pub worker_id: String,
    pub topic_name: String,
    pub max_tasks: usize,
    #[serde(default)]
    pub offset: usize,
    /// Milliseconds
    pub lock_duration: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendLockRequest {
    pub worker_id: String,
    /// Milliseconds from now
    pub additional_duration: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishRequest {
    pub worker_id: String,
    #[serde(default)]
    pub result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BpmnErrorRequest {
    pub worker_id: String,
    pub error_code: String,
    #[serde(default)]
    pub error_message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceErrorRequest {
    pub worker_id: String,
    pub error_message: String,
    #[serde(default)]
    pub error_details: serde_json::Value,
}

fn outcome<T>(result: &Result<T, CoreError>) -> QueueOutcome {
    match result {
        Ok(_) => QueueOutcome::Success,
        Err(CoreError::StateStoreError(_) | CoreError::SerializationError(_)) => {
            QueueOutcome::Failed
        }
        Err(_) => QueueOutcome::Rejected,
    }
}

/// `POST /v1/fetch_and_lock`
pub async fn fetch_and_lock(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<FetchAndLockRequest>,
) -> Result<Json<Vec<ExternalTask>>, ApiError> {
    let identity = state.caller(&headers).await?;
    let request = LockRequest::new(
        body.worker_id,
        body.topic_name,
        body.max_tasks,
        Duration::from_millis(body.lock_duration),
    )
    .with_offset(body.offset);

    let result = state
        .runtime
        .external_tasks()
        .fetch_and_lock(&identity, &request)
        .await;
    QueueMetrics::record_fetch_and_lock(
        &request.topic,
        &request.worker_id,
        request.max_tasks,
        result.as_ref().map_or(0, Vec::len),
        outcome(&result),
    );
    Ok(Json(result?))
}

/// `POST /v1/external_tasks/:external_task_id/extend_lock`
pub async fn extend_lock(
    State(state): State<Arc<AppState>>,
    Path(external_task_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ExtendLockRequest>,
) -> Result<StatusCode, ApiError> {
    let identity = state.caller(&headers).await?;
    let result = state
        .runtime
        .external_tasks()
        .extend_lock(
            &identity,
            &body.worker_id,
            &ExternalTaskId::from(external_task_id),
            Duration::from_millis(body.additional_duration),
        )
        .await;
    QueueMetrics::record_extend_lock(&body.worker_id, outcome(&result));
    result?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /v1/external_tasks/:external_task_id/finish`
pub async fn finish(
    State(state): State<Arc<AppState>>,
    Path(external_task_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<FinishRequest>,
) -> Result<StatusCode, ApiError> {
    let identity = state.caller(&headers).await?;
    let result = state
        .runtime
        .external_tasks()
        .finish(
            &identity,
            &body.worker_id,
            &ExternalTaskId::from(external_task_id),
            TokenPayload::new(body.result),
        )
        .await;
    QueueMetrics::record_completion(&body.worker_id, "result", outcome(&result));
    result?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /v1/external_tasks/:external_task_id/handle_bpmn_error`
pub async fn handle_bpmn_error(
    State(state): State<Arc<AppState>>,
    Path(external_task_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<BpmnErrorRequest>,
) -> Result<StatusCode, ApiError> {
    let identity = state.caller(&headers).await?;
    let result = state
        .runtime
        .external_tasks()
        .handle_bpmn_error(
            &identity,
            &body.worker_id,
            &ExternalTaskId::from(external_task_id),
            &body.error_code,
            &body.error_message,
        )
        .await;
    QueueMetrics::record_completion(&body.worker_id, "bpmn_error", outcome(&result));
    result?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /v1/external_tasks/:external_task_id/handle_service_error`
pub async fn handle_service_error(
    State(state): State<Arc<AppState>>,
    Path(external_task_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ServiceErrorRequest>,
) -> Result<StatusCode, ApiError> {
    let identity = state.caller(&headers).await?;
    let result = state
        .runtime
        .external_tasks()
        .handle_service_error(
            &identity,
            &body.worker_id,
            &ExternalTaskId::from(external_task_id),
            &body.error_message,
            body.error_details,
        )
        .await;
    QueueMetrics::record_completion(&body.worker_id, "service_error", outcome(&result));
    result?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /v1/external_tasks/:external_task_id`
pub async fn get_external_task(
    State(state): State<Arc<AppState>>,
    Path(external_task_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ExternalTask>, ApiError> {
    let identity = state.caller(&headers).await?;
    let task = state
        .runtime
        .external_tasks()
        .get(&identity, &ExternalTaskId::from(external_task_id))
        .await?;
    Ok(Json(task))
}

/// `POST /v1/admin/reclaim_expired_locks`
pub async fn reclaim_expired_locks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ExternalTask>>, ApiError> {
    let identity = state.caller(&headers).await?;
    let reclaimed = state
        .runtime
        .external_tasks()
        .reclaim_expired_locks(&identity)
        .await?;
    QueueMetrics::record_reclaimed(reclaimed.len());
    Ok(Json(reclaimed))
}
