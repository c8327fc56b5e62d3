use crate::domain::identity::Identity;
use crate::domain::ids::{
    CorrelationId, FlowNodeId, FlowNodeInstanceId, ProcessInstanceId, ProcessModelId,
};
use crate::types::TokenPayload;
use crate::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of flow node that suspends until completed from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowNodeType {
    /// Completed by a human through the task list
    UserTask,
    /// Completed by a human acknowledging offline work
    ManualTask,
    /// Placeholder activity continued explicitly
    EmptyActivity,
    /// Completed by an out-of-process worker through a lease
    ExternalTask,
    /// Intermediate catch event waiting for a trigger
    Event,
}

impl FlowNodeType {
    /// Wire and column representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowNodeType::UserTask => "UserTask",
            FlowNodeType::ManualTask => "ManualTask",
            FlowNodeType::EmptyActivity => "EmptyActivity",
            FlowNodeType::ExternalTask => "ExternalTask",
            FlowNodeType::Event => "Event",
        }
    }

    /// Whether completion goes through the external task lease queue
    pub fn is_external_task(&self) -> bool {
        matches!(self, FlowNodeType::ExternalTask)
    }
}

impl fmt::Display for FlowNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowNodeType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UserTask" => Ok(FlowNodeType::UserTask),
            "ManualTask" => Ok(FlowNodeType::ManualTask),
            "EmptyActivity" => Ok(FlowNodeType::EmptyActivity),
            "ExternalTask" => Ok(FlowNodeType::ExternalTask),
            "Event" => Ok(FlowNodeType::Event),
            other => Err(CoreError::BadRequest(format!(
                "Unknown flow node type: {}",
                other
            ))),
        }
    }
}

/// Flow node instance state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowNodeInstanceState {
    /// Waiting for external completion
    Suspended,
    /// Exited normally
    Finished,
    /// Failed or force-finished by termination
    Error,
}

impl FlowNodeInstanceState {
    /// Column representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowNodeInstanceState::Suspended => "suspended",
            FlowNodeInstanceState::Finished => "finished",
            FlowNodeInstanceState::Error => "error",
        }
    }
}

impl fmt::Display for FlowNodeInstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowNodeInstanceState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "suspended" => Ok(FlowNodeInstanceState::Suspended),
            "finished" => Ok(FlowNodeInstanceState::Finished),
            "error" => Ok(FlowNodeInstanceState::Error),
            other => Err(CoreError::SerializationError(format!(
                "Unknown flow node instance state: {}",
                other
            ))),
        }
    }
}

/// One execution of a single flow node within a process instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNodeInstance {
    pub id: FlowNodeInstanceId,
    pub flow_node_id: FlowNodeId,
    pub flow_node_type: FlowNodeType,
    pub process_instance_id: ProcessInstanceId,
    pub process_model_id: ProcessModelId,
    pub correlation_id: CorrelationId,
    pub previous_flow_node_instance_id: Option<FlowNodeInstanceId>,
    pub owner: Identity,
    pub token: TokenPayload,
    pub state: FlowNodeInstanceState,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlowNodeInstance {
    /// Create a suspended flow node instance
    #[allow(clippy::too_many_arguments)]
    pub fn suspended(
        flow_node_id: FlowNodeId,
        flow_node_type: FlowNodeType,
        process_instance_id: ProcessInstanceId,
        process_model_id: ProcessModelId,
        correlation_id: CorrelationId,
        previous_flow_node_instance_id: Option<FlowNodeInstanceId>,
        owner: Identity,
        token: TokenPayload,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: FlowNodeInstanceId::generate(),
            flow_node_id,
            flow_node_type,
            process_instance_id,
            process_model_id,
            correlation_id,
            previous_flow_node_instance_id,
            owner,
            token,
            state: FlowNodeInstanceState::Suspended,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the instance still waits for completion
    pub fn is_suspended(&self) -> bool {
        self.state == FlowNodeInstanceState::Suspended
    }

    fn ensure_suspended(&self) -> Result<(), CoreError> {
        if !self.is_suspended() {
            return Err(CoreError::InvalidState(format!(
                "Flow node instance {} is already {}",
                self.id, self.state
            )));
        }
        Ok(())
    }

    /// Exit normally, merging the result into the token
    pub fn finish(&mut self, result: &TokenPayload, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.ensure_suspended()?;
        self.token.merge(result);
        self.state = FlowNodeInstanceState::Finished;
        self.updated_at = now;
        Ok(())
    }

    /// Exit with an error
    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.ensure_suspended()?;
        self.state = FlowNodeInstanceState::Error;
        self.error = Some(error.into());
        self.updated_at = now;
        Ok(())
    }
}

/// Criteria for suspended flow node instance queries
///
/// Unset fields match everything. `owner` compares user ids only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowNodeInstanceFilter {
    pub state: Option<FlowNodeInstanceState>,
    pub flow_node_type: Option<FlowNodeType>,
    pub process_instance_id: Option<ProcessInstanceId>,
    pub process_model_id: Option<ProcessModelId>,
    pub correlation_id: Option<CorrelationId>,
    pub flow_node_id: Option<FlowNodeId>,
    pub owner_user_id: Option<String>,
}

impl FlowNodeInstanceFilter {
    /// Filter matching suspended instances only
    pub fn suspended() -> Self {
        Self {
            state: Some(FlowNodeInstanceState::Suspended),
            ..Self::default()
        }
    }

    pub fn with_process_instance(mut self, id: ProcessInstanceId) -> Self {
        self.process_instance_id = Some(id);
        self
    }

    pub fn with_process_model(mut self, id: ProcessModelId) -> Self {
        self.process_model_id = Some(id);
        self
    }

    pub fn with_correlation(mut self, id: CorrelationId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn with_flow_node(mut self, id: FlowNodeId) -> Self {
        self.flow_node_id = Some(id);
        self
    }

    pub fn with_type(mut self, flow_node_type: FlowNodeType) -> Self {
        self.flow_node_type = Some(flow_node_type);
        self
    }

    pub fn with_owner(mut self, user_id: impl Into<String>) -> Self {
        self.owner_user_id = Some(user_id.into());
        self
    }

    /// Whether the instance satisfies every set criterion
    pub fn matches(&self, instance: &FlowNodeInstance) -> bool {
        self.state.map_or(true, |s| instance.state == s)
            && self
                .flow_node_type
                .map_or(true, |t| instance.flow_node_type == t)
            && self
                .process_instance_id
                .as_ref()
                .map_or(true, |id| &instance.process_instance_id == id)
            && self
                .process_model_id
                .as_ref()
                .map_or(true, |id| &instance.process_model_id == id)
            && self
                .correlation_id
                .as_ref()
                .map_or(true, |id| &instance.correlation_id == id)
            && self
                .flow_node_id
                .as_ref()
                .map_or(true, |id| &instance.flow_node_id == id)
            && self
                .owner_user_id
                .as_ref()
                .map_or(true, |user| &instance.owner.user_id == user)
    }
}
