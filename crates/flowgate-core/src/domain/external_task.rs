//! External task aggregate and its lease state machine
//!
//! `pending --lock--> locked --extend_lock--> locked --finish--> finished`.
//! `finished` is absorbing. Every mutating method checks, in order: the
//! task is not finished (`Gone`), the caller holds the lock (`Locked`),
//! and the task is locked at all (`InvalidState`).

use crate::domain::ids::{
    CorrelationId, ExternalTaskId, FlowNodeInstanceId, ProcessInstanceId, ProcessModelId,
};
use crate::types::TokenPayload;
use crate::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// External task state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalTaskState {
    Pending,
    Locked,
    Finished,
}

impl ExternalTaskState {
    /// Column representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ExternalTaskState::Pending => "pending",
            ExternalTaskState::Locked => "locked",
            ExternalTaskState::Finished => "finished",
        }
    }
}

impl fmt::Display for ExternalTaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExternalTaskState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExternalTaskState::Pending),
            "locked" => Ok(ExternalTaskState::Locked),
            "finished" => Ok(ExternalTaskState::Finished),
            other => Err(CoreError::SerializationError(format!(
                "Unknown external task state: {}",
                other
            ))),
        }
    }
}

/// Error a task ended with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExternalTaskError {
    /// Business error, routed to a boundary error event by code
    Bpmn { code: String, message: String },

    /// Technical failure of the worker, faults the process instance
    Service {
        message: String,
        #[serde(default)]
        details: serde_json::Value,
    },

    /// Task aborted by process termination
    Aborted { reason: String },
}

impl ExternalTaskError {
    /// Error code reported to callers
    pub fn code(&self) -> &str {
        match self {
            ExternalTaskError::Bpmn { code, .. } => code,
            ExternalTaskError::Service { .. } => "ServiceError",
            ExternalTaskError::Aborted { .. } => "Aborted",
        }
    }

    /// Human-readable message
    pub fn message(&self) -> &str {
        match self {
            ExternalTaskError::Bpmn { message, .. } | ExternalTaskError::Service { message, .. } => {
                message
            }
            ExternalTaskError::Aborted { reason } => reason,
        }
    }
}

impl fmt::Display for ExternalTaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

/// A unit of work completed by an out-of-process worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalTask {
    pub id: ExternalTaskId,
    pub worker_id: Option<String>,
    pub topic: String,
    pub state: ExternalTaskState,
    pub flow_node_instance_id: FlowNodeInstanceId,
    pub correlation_id: CorrelationId,
    pub process_instance_id: ProcessInstanceId,
    pub process_model_id: ProcessModelId,
    pub payload: TokenPayload,
    pub lock_expiration_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<TokenPayload>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<ExternalTaskError>,
}

impl ExternalTask {
    /// Create a pending task for a flow node instance
    pub fn new(
        flow_node_instance_id: FlowNodeInstanceId,
        process_instance_id: ProcessInstanceId,
        process_model_id: ProcessModelId,
        correlation_id: CorrelationId,
        topic: impl Into<String>,
        payload: TokenPayload,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ExternalTaskId::generate(),
            worker_id: None,
            topic: topic.into(),
            state: ExternalTaskState::Pending,
            flow_node_instance_id,
            correlation_id,
            process_instance_id,
            process_model_id,
            payload,
            lock_expiration_time: None,
            created_at: now,
            finished_at: None,
            result: None,
            error: None,
        }
    }

    /// Reserve a pending task for a worker
    pub fn lock(
        &mut self,
        worker_id: &str,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        if self.state != ExternalTaskState::Pending {
            return Err(CoreError::InvalidState(format!(
                "External task {} is {}, not pending",
                self.id, self.state
            )));
        }
        let lock_expiration_time = lease_end(now, duration)?;
        self.worker_id = Some(worker_id.to_string());
        self.state = ExternalTaskState::Locked;
        self.lock_expiration_time = Some(lock_expiration_time);
        Ok(())
    }

    /// Check that `worker_id` holds the lock on this task
    pub fn ensure_locked_by(&self, worker_id: &str) -> Result<(), CoreError> {
        if self.state == ExternalTaskState::Finished {
            return Err(CoreError::Gone(format!(
                "External task {} is already finished",
                self.id
            )));
        }
        match self.worker_id.as_deref() {
            Some(holder) if holder != worker_id => Err(CoreError::Locked(format!(
                "External task {} is locked by another worker",
                self.id
            ))),
            _ if self.state != ExternalTaskState::Locked => Err(CoreError::InvalidState(format!(
                "External task {} is not locked",
                self.id
            ))),
            _ => Ok(()),
        }
    }

    /// Set the lease end to `now + duration`; not cumulative
    pub fn extend_lock(
        &mut self,
        worker_id: &str,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.ensure_locked_by(worker_id)?;
        self.lock_expiration_time = Some(lease_end(now, duration)?);
        Ok(())
    }

    /// Complete with a result
    pub fn finish(
        &mut self,
        worker_id: &str,
        result: TokenPayload,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.ensure_locked_by(worker_id)?;
        self.state = ExternalTaskState::Finished;
        self.result = Some(result);
        self.finished_at = Some(now);
        Ok(())
    }

    /// Complete with a BPMN or service error
    pub fn finish_with_error(
        &mut self,
        worker_id: &str,
        error: ExternalTaskError,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.ensure_locked_by(worker_id)?;
        self.state = ExternalTaskState::Finished;
        self.error = Some(error);
        self.finished_at = Some(now);
        Ok(())
    }

    /// Abort regardless of the lock holder; used by termination
    pub fn abort(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<(), CoreError> {
        if self.state == ExternalTaskState::Finished {
            return Err(CoreError::Gone(format!(
                "External task {} is already finished",
                self.id
            )));
        }
        self.state = ExternalTaskState::Finished;
        self.error = Some(ExternalTaskError::Aborted {
            reason: reason.into(),
        });
        self.lock_expiration_time = None;
        self.finished_at = Some(now);
        Ok(())
    }

    /// Return an expired lease to the pending pool
    pub fn release_expired_lock(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_lock_expired(now) {
            return false;
        }
        self.state = ExternalTaskState::Pending;
        self.worker_id = None;
        self.lock_expiration_time = None;
        true
    }

    /// Whether the task is locked and its lease has run out
    pub fn is_lock_expired(&self, now: DateTime<Utc>) -> bool {
        self.state == ExternalTaskState::Locked
            && self.lock_expiration_time.map_or(false, |end| end <= now)
    }
}

/// Longest lease a worker may request in one call
pub const MAX_LOCK_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Reject lease durations above [`MAX_LOCK_DURATION`]
pub fn validate_lock_duration(duration: Duration) -> Result<(), CoreError> {
    if duration > MAX_LOCK_DURATION {
        return Err(CoreError::BadRequest(format!(
            "Lock duration {:?} exceeds the maximum of {:?}",
            duration, MAX_LOCK_DURATION
        )));
    }
    Ok(())
}

fn lease_end(now: DateTime<Utc>, duration: Duration) -> Result<DateTime<Utc>, CoreError> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .ok_or_else(|| CoreError::BadRequest(format!("Lock duration out of range: {:?}", duration)))
}

/// Parameters of a fetch-and-lock poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRequest {
    pub worker_id: String,
    pub topic: String,
    pub max_tasks: usize,
    pub offset: usize,
    pub lock_duration: Duration,
}

impl LockRequest {
    pub fn new(
        worker_id: impl Into<String>,
        topic: impl Into<String>,
        max_tasks: usize,
        lock_duration: Duration,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            topic: topic.into(),
            max_tasks,
            offset: 0,
            lock_duration,
        }
    }

    /// Skip the first `offset` matching tasks
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Reject requests that cannot identify a worker or a topic
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.worker_id.trim().is_empty() {
            return Err(CoreError::BadRequest("workerId must not be empty".to_string()));
        }
        if self.topic.trim().is_empty() {
            return Err(CoreError::BadRequest("topic must not be empty".to_string()));
        }
        validate_lock_duration(self.lock_duration)
    }
}
