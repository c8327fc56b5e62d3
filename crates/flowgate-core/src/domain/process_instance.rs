use crate::domain::identity::Identity;
use crate::domain::ids::{CorrelationId, ProcessInstanceId, ProcessModelId};
use crate::types::TokenPayload;
use crate::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Process instance state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessInstanceState {
    /// Instance is executing or waiting on a suspended flow node
    Running,

    /// Instance reached an end event
    Finished,

    /// Instance faulted or was terminated by an operator
    Error,

    /// Instance stopped by the routing engine without a fault
    Terminated,
}

impl ProcessInstanceState {
    /// Column representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessInstanceState::Running => "running",
            ProcessInstanceState::Finished => "finished",
            ProcessInstanceState::Error => "error",
            ProcessInstanceState::Terminated => "terminated",
        }
    }

    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProcessInstanceState::Running)
    }
}

impl fmt::Display for ProcessInstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessInstanceState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ProcessInstanceState::Running),
            "finished" => Ok(ProcessInstanceState::Finished),
            "error" => Ok(ProcessInstanceState::Error),
            "terminated" => Ok(ProcessInstanceState::Terminated),
            other => Err(CoreError::SerializationError(format!(
                "Unknown process instance state: {}",
                other
            ))),
        }
    }
}

/// Aggregate: one execution of a process model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInstance {
    /// Unique identifier
    pub id: ProcessInstanceId,

    /// Process model this instance executes
    pub process_model_id: ProcessModelId,

    /// Correlation grouping this instance with others started together
    pub correlation_id: CorrelationId,

    /// Process instance that called this one, for call activities
    pub parent_process_instance_id: Option<ProcessInstanceId>,

    /// Identity that started the instance
    pub owner: Identity,

    /// Current state
    pub state: ProcessInstanceState,

    /// Token supplied at start
    pub start_token: TokenPayload,

    /// Token at the end event
    pub end_token: Option<TokenPayload>,

    /// Error message if the instance faulted
    pub error: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl ProcessInstance {
    /// Create a running process instance
    pub fn new(
        process_model_id: ProcessModelId,
        correlation_id: CorrelationId,
        owner: Identity,
        start_token: TokenPayload,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ProcessInstanceId::generate(),
            process_model_id,
            correlation_id,
            parent_process_instance_id: None,
            owner,
            state: ProcessInstanceState::Running,
            start_token,
            end_token: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the instance still runs
    pub fn is_running(&self) -> bool {
        self.state == ProcessInstanceState::Running
    }

    fn ensure_running(&self) -> Result<(), CoreError> {
        if !self.is_running() {
            return Err(CoreError::InvalidState(format!(
                "Process instance {} is {}",
                self.id, self.state
            )));
        }
        Ok(())
    }

    /// Finish with the end event's token
    pub fn finish(&mut self, end_token: TokenPayload, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.ensure_running()?;
        self.state = ProcessInstanceState::Finished;
        self.end_token = Some(end_token);
        self.updated_at = now;
        Ok(())
    }

    /// Fault the instance
    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.ensure_running()?;
        self.state = ProcessInstanceState::Error;
        self.error = Some(error.into());
        self.updated_at = now;
        Ok(())
    }
}
