//! Mock and fake implementations of the routing engine port.

use async_trait::async_trait;
use flowgate_core::{
    CoreError, ErrorRouting, ExternalTaskError, FlowNodeId, FlowNodeInstance,
    FlowNodeInstanceId, RoutingEngine, RoutingOutcome,
};
use mockall::mock;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

mock! {
    pub RoutingEngine {}

    #[async_trait]
    impl RoutingEngine for RoutingEngine {
        async fn resume(&self, flow_node_instance: &FlowNodeInstance)
            -> Result<RoutingOutcome, CoreError>;

        async fn route_bpmn_error(
            &self,
            flow_node_instance: &FlowNodeInstance,
            error: &ExternalTaskError,
        ) -> Result<ErrorRouting, CoreError>;
    }
}

/// Rule-driven engine for scenario tests
///
/// Finishing a flow node listed as an end node ends the process instance
/// with the flow node's token. A BPMN error whose code is listed is caught.
/// Every call is recorded.
#[derive(Debug, Clone, Default)]
pub struct StaticRoutingEngine {
    end_nodes: HashSet<FlowNodeId>,
    caught_codes: HashSet<String>,
    resumed: Arc<Mutex<Vec<FlowNodeInstanceId>>>,
    routed_errors: Arc<Mutex<Vec<String>>>,
}

impl StaticRoutingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finishing this flow node ends the process
    pub fn ending_at(mut self, flow_node_id: impl Into<FlowNodeId>) -> Self {
        self.end_nodes.insert(flow_node_id.into());
        self
    }

    /// A boundary event catches this error code
    pub fn catching(mut self, error_code: impl Into<String>) -> Self {
        self.caught_codes.insert(error_code.into());
        self
    }

    /// Flow node instances handed back through `resume`, in call order
    pub fn resumed(&self) -> Vec<FlowNodeInstanceId> {
        self.resumed.lock().clone()
    }

    /// Error codes routed through `route_bpmn_error`, in call order
    pub fn routed_errors(&self) -> Vec<String> {
        self.routed_errors.lock().clone()
    }
}

#[async_trait]
impl RoutingEngine for StaticRoutingEngine {
    async fn resume(
        &self,
        flow_node_instance: &FlowNodeInstance,
    ) -> Result<RoutingOutcome, CoreError> {
        self.resumed.lock().push(flow_node_instance.id.clone());
        if self.end_nodes.contains(&flow_node_instance.flow_node_id) {
            Ok(RoutingOutcome::ProcessEnded(flow_node_instance.token.clone()))
        } else {
            Ok(RoutingOutcome::Continued)
        }
    }

    async fn route_bpmn_error(
        &self,
        _flow_node_instance: &FlowNodeInstance,
        error: &ExternalTaskError,
    ) -> Result<ErrorRouting, CoreError> {
        self.routed_errors.lock().push(error.code().to_string());
        if self.caught_codes.contains(error.code()) {
            Ok(ErrorRouting::Caught)
        } else {
            Ok(ErrorRouting::Uncaught)
        }
    }
}
