//! Runtime builder and handles for scenario tests.

use crate::error::TestError;
use crate::fixtures::ManualClock;
use flowgate_core::{
    AuthorizationGate, ChannelEventPublisher, ClaimBasedAuthorizationGate, EnterFlowNode,
    FlowNodeInstance, FlowNodeType, Identity, ProcessInstance, RoutingEngine, RuntimeInterface,
    RuntimeRepositories, StartProcessInstance, TokenPayload,
};
use flowgate_state_inmemory::InMemoryStateStoreProvider;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Builder for a runtime over the in-memory state store.
#[derive(Default)]
pub struct TestRuntimeBuilder {
    routing: Option<Arc<dyn RoutingEngine>>,
    gate: Option<Arc<dyn AuthorizationGate>>,
    clock: Option<ManualClock>,
}

impl fmt::Debug for TestRuntimeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestRuntimeBuilder")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl TestRuntimeBuilder {
    /// Creates a new TestRuntimeBuilder with default collaborators.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the routing engine; the default never ends a process.
    pub fn with_routing<R: RoutingEngine + 'static>(mut self, routing: R) -> Self {
        self.routing = Some(Arc::new(routing));
        self
    }

    /// Sets the authorization gate; the default is claim based.
    pub fn with_gate<G: AuthorizationGate + 'static>(mut self, gate: G) -> Self {
        self.gate = Some(Arc::new(gate));
        self
    }

    /// Sets the clock; the default starts at 2024-01-01.
    pub fn with_clock(mut self, clock: ManualClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> TestRuntime {
        let repositories = InMemoryStateStoreProvider::new().create_repositories();
        let clock = self.clock.unwrap_or_default();
        let publisher = Arc::new(ChannelEventPublisher::new());

        let mut builder = RuntimeInterface::builder(repositories.clone())
            .with_authorization_gate(
                self.gate
                    .unwrap_or_else(|| Arc::new(ClaimBasedAuthorizationGate::default())),
            )
            .with_publisher(publisher.clone())
            .with_clock(Arc::new(clock.clone()));
        if let Some(routing) = self.routing {
            builder = builder.with_routing_engine(routing);
        }

        TestRuntime {
            runtime: builder.build(),
            repositories,
            publisher,
            clock,
        }
    }
}

/// Handles to a running test runtime
#[derive(Clone)]
pub struct TestRuntime {
    pub runtime: RuntimeInterface,
    /// Direct store access, bypassing authorization
    pub repositories: RuntimeRepositories,
    pub publisher: Arc<ChannelEventPublisher>,
    pub clock: ManualClock,
}

impl TestRuntime {
    pub fn builder() -> TestRuntimeBuilder {
        TestRuntimeBuilder::new()
    }

    /// Start a process instance of `process_model_id` owned by `owner`
    pub async fn start_process(
        &self,
        owner: &Identity,
        process_model_id: &str,
        start_token: Value,
    ) -> Result<ProcessInstance, TestError> {
        let instance = self
            .runtime
            .process_instances()
            .start(
                owner,
                StartProcessInstance::new(process_model_id, TokenPayload::new(start_token)),
            )
            .await?;
        Ok(instance)
    }

    /// Suspend an external task node on `topic`
    pub async fn enter_external_task(
        &self,
        process_instance: &ProcessInstance,
        flow_node_id: &str,
        topic: &str,
        payload: Value,
    ) -> Result<FlowNodeInstance, TestError> {
        let request = EnterFlowNode::new(
            process_instance.id.clone(),
            flow_node_id,
            FlowNodeType::ExternalTask,
            process_instance.owner.clone(),
            TokenPayload::new(payload),
        )
        .with_topic(topic);
        Ok(self.runtime.flow_nodes().enter(request).await?)
    }

    /// Suspend a node that waits for a user or an event
    pub async fn enter_suspended(
        &self,
        process_instance: &ProcessInstance,
        flow_node_id: &str,
        flow_node_type: FlowNodeType,
        payload: Value,
    ) -> Result<FlowNodeInstance, TestError> {
        if flow_node_type.is_external_task() {
            return Err(TestError::TestSetupFailed(
                "use enter_external_task for external task nodes".to_string(),
            ));
        }
        let request = EnterFlowNode::new(
            process_instance.id.clone(),
            flow_node_id,
            flow_node_type,
            process_instance.owner.clone(),
            TokenPayload::new(payload),
        );
        Ok(self.runtime.flow_nodes().enter(request).await?)
    }
}
