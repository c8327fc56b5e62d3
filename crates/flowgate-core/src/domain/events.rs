use crate::domain::external_task::ExternalTaskError;
use crate::domain::flow_node_instance::FlowNodeType;
use crate::domain::identity::Identity;
use crate::domain::ids::{
    CorrelationId, ExternalTaskId, FlowNodeId, FlowNodeInstanceId, ProcessInstanceId,
    ProcessModelId,
};
use crate::types::TokenPayload;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::any::Any;
use std::fmt::Debug;

/// Domain event trait for all lifecycle notifications
pub trait DomainEvent: Debug + Send + Sync + 'static {
    /// Returns the type of the event as a string
    fn event_type(&self) -> &'static str;

    /// Returns the process instance ID this event is associated with
    fn process_instance_id(&self) -> &ProcessInstanceId;

    /// Returns the timestamp when the event occurred
    fn timestamp(&self) -> DateTime<Utc>;

    /// JSON rendering for transports
    fn to_json(&self) -> serde_json::Value;

    /// Convert to Any for downcasting
    fn as_any(&self) -> &dyn Any;
}

macro_rules! domain_event {
    ($name:ident, $event_type:literal) => {
        impl DomainEvent for $name {
            fn event_type(&self) -> &'static str {
                $event_type
            }

            fn process_instance_id(&self) -> &ProcessInstanceId {
                &self.process_instance_id
            }

            fn timestamp(&self) -> DateTime<Utc> {
                self.timestamp
            }

            fn to_json(&self) -> serde_json::Value {
                serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

/// Event: Process instance started
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInstanceStarted {
    /// The process instance
    pub process_instance_id: ProcessInstanceId,
    /// The process model it runs
    pub process_model_id: ProcessModelId,
    /// Correlation it belongs to
    pub correlation_id: CorrelationId,
    /// Identity that started it
    pub identity: Identity,
    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

domain_event!(ProcessInstanceStarted, "process_instance.started");

/// Event: Process instance reached an end event
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInstanceFinished {
    /// The process instance
    pub process_instance_id: ProcessInstanceId,
    /// Correlation it belongs to
    pub correlation_id: CorrelationId,
    /// Final token
    pub result: TokenPayload,
    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

domain_event!(ProcessInstanceFinished, "process_instance.finished");

/// Event: Process instance faulted
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInstanceFailed {
    /// The process instance
    pub process_instance_id: ProcessInstanceId,
    /// Correlation it belongs to
    pub correlation_id: CorrelationId,
    /// Error description
    pub error: String,
    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

domain_event!(ProcessInstanceFailed, "process_instance.failed");

/// Event: Process instance terminated by an operator
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInstanceTerminated {
    /// The process instance
    pub process_instance_id: ProcessInstanceId,
    /// Correlation it belongs to
    pub correlation_id: CorrelationId,
    /// Identity that requested termination
    pub terminated_by: Identity,
    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

domain_event!(ProcessInstanceTerminated, "process_instance.terminated");

/// Event: Flow node suspended, waiting for external completion
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNodeSuspended {
    /// The process instance
    pub process_instance_id: ProcessInstanceId,
    /// Correlation it belongs to
    pub correlation_id: CorrelationId,
    /// The suspended flow node instance
    pub flow_node_instance_id: FlowNodeInstanceId,
    /// Definition-level node id
    pub flow_node_id: FlowNodeId,
    /// Node type
    pub flow_node_type: FlowNodeType,
    /// Owning identity
    pub identity: Identity,
    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

domain_event!(FlowNodeSuspended, "flow_node.suspended");

/// Event: Flow node finished
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNodeFinished {
    /// The process instance
    pub process_instance_id: ProcessInstanceId,
    /// Correlation it belongs to
    pub correlation_id: CorrelationId,
    /// The finished flow node instance
    pub flow_node_instance_id: FlowNodeInstanceId,
    /// Definition-level node id
    pub flow_node_id: FlowNodeId,
    /// Token after the result was merged
    pub token: TokenPayload,
    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

domain_event!(FlowNodeFinished, "flow_node.finished");

/// Event: Flow node ended in error
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNodeFailed {
    /// The process instance
    pub process_instance_id: ProcessInstanceId,
    /// Correlation it belongs to
    pub correlation_id: CorrelationId,
    /// The failed flow node instance
    pub flow_node_instance_id: FlowNodeInstanceId,
    /// Definition-level node id
    pub flow_node_id: FlowNodeId,
    /// Error description
    pub error: String,
    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

domain_event!(FlowNodeFailed, "flow_node.failed");

/// Event: External task reserved by a worker
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalTaskLocked {
    /// The process instance
    pub process_instance_id: ProcessInstanceId,
    /// The locked task
    pub external_task_id: ExternalTaskId,
    /// Topic the task was fetched from
    pub topic: String,
    /// Worker holding the lease
    pub worker_id: String,
    /// Lease end
    pub lock_expiration_time: DateTime<Utc>,
    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

domain_event!(ExternalTaskLocked, "external_task.locked");

/// Event: External task reached its terminal state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalTaskFinished {
    /// The process instance
    pub process_instance_id: ProcessInstanceId,
    /// The finished task
    pub external_task_id: ExternalTaskId,
    /// Worker that completed it, if any
    pub worker_id: Option<String>,
    /// Set when the task ended with an error
    pub error: Option<ExternalTaskError>,
    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

domain_event!(ExternalTaskFinished, "external_task.finished");
