//! Boundary to the graph-traversal engine
//!
//! The core only knows that a flow node exited. Deciding what runs next,
//! and whether a boundary error event catches a BPMN error, belongs to the
//! engine behind this port.

use crate::domain::external_task::ExternalTaskError;
use crate::domain::flow_node_instance::FlowNodeInstance;
use crate::types::TokenPayload;
use crate::CoreError;
use async_trait::async_trait;

/// What happened after a flow node was handed back to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingOutcome {
    /// Execution moved on; the process instance keeps running
    Continued,
    /// The engine reached an end event with this token
    ProcessEnded(TokenPayload),
}

/// Whether a BPMN error found a matching boundary event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorRouting {
    Caught,
    Uncaught,
}

/// Routing engine port
#[async_trait]
pub trait RoutingEngine: Send + Sync {
    /// Continue execution after `flow_node_instance` finished
    async fn resume(&self, flow_node_instance: &FlowNodeInstance)
        -> Result<RoutingOutcome, CoreError>;

    /// Match a BPMN error against boundary events of the enclosing scope
    async fn route_bpmn_error(
        &self,
        flow_node_instance: &FlowNodeInstance,
        error: &ExternalTaskError,
    ) -> Result<ErrorRouting, CoreError>;
}

/// Engine that never moves on and never catches errors
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRoutingEngine;

#[async_trait]
impl RoutingEngine for NullRoutingEngine {
    async fn resume(
        &self,
        _flow_node_instance: &FlowNodeInstance,
    ) -> Result<RoutingOutcome, CoreError> {
        Ok(RoutingOutcome::Continued)
    }

    async fn route_bpmn_error(
        &self,
        _flow_node_instance: &FlowNodeInstance,
        _error: &ExternalTaskError,
    ) -> Result<ErrorRouting, CoreError> {
        Ok(ErrorRouting::Uncaught)
    }
}
