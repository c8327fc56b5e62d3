use crate::application::authorization::{AuthorizationGate, ClaimBasedAuthorizationGate};
use crate::application::external_task_service::ExternalTaskService;
use crate::application::flow_node_instance_service::FlowNodeInstanceService;
use crate::application::notification::{ChannelEventPublisher, NotificationPublisher, SharedEvent};
use crate::application::process_instance_service::ProcessInstanceService;
use crate::application::routing::{NullRoutingEngine, RoutingEngine};
use crate::application::token_history::TokenHistoryLedger;
use crate::domain::events::DomainEvent;
use crate::domain::repository::{
    ExternalTaskRepository, FlowNodeInstanceRepository, ProcessInstanceRepository,
    TokenHistoryRepository,
};
use crate::types::{Clock, SystemClock};
use std::sync::Arc;
use tracing::warn;

/// The repositories a runtime is built on
///
/// State-store crates produce one of these; the core never names a
/// concrete store.
#[derive(Clone)]
pub struct RuntimeRepositories {
    pub process_instances: Arc<dyn ProcessInstanceRepository>,
    pub flow_node_instances: Arc<dyn FlowNodeInstanceRepository>,
    pub external_tasks: Arc<dyn ExternalTaskRepository>,
    pub token_history: Arc<dyn TokenHistoryRepository>,
}

/// Collaborators shared by every service
#[derive(Clone)]
pub struct RuntimeContext {
    pub repositories: RuntimeRepositories,
    pub gate: Arc<dyn AuthorizationGate>,
    pub publisher: Arc<dyn NotificationPublisher>,
    pub clock: Arc<dyn Clock>,
}

impl RuntimeContext {
    /// Publish an event; delivery failures are logged and never fail the command
    pub async fn publish<E: DomainEvent>(&self, event: E) {
        let event: SharedEvent = Arc::new(event);
        let event_type = event.event_type();
        if let Err(e) = self.publisher.publish(event).await {
            warn!(event_type, error = %e, "Failed to publish event");
        }
    }
}

/// The main API provided by Flowgate Core to external systems
#[derive(Clone)]
pub struct RuntimeInterface {
    process_instances: ProcessInstanceService,
    flow_nodes: FlowNodeInstanceService,
    external_tasks: ExternalTaskService,
    token_history: TokenHistoryLedger,
    context: RuntimeContext,
}

impl RuntimeInterface {
    /// Start building a runtime on the given repositories
    pub fn builder(repositories: RuntimeRepositories) -> RuntimeBuilder {
        RuntimeBuilder::new(repositories)
    }

    /// Process instance start and lookup
    pub fn process_instances(&self) -> &ProcessInstanceService {
        &self.process_instances
    }

    /// Flow node instance lifecycle manager
    pub fn flow_nodes(&self) -> &FlowNodeInstanceService {
        &self.flow_nodes
    }

    /// External task lease queue
    pub fn external_tasks(&self) -> &ExternalTaskService {
        &self.external_tasks
    }

    /// Token history ledger and active tokens
    pub fn token_history(&self) -> &TokenHistoryLedger {
        &self.token_history
    }

    /// Shared collaborators
    pub fn context(&self) -> &RuntimeContext {
        &self.context
    }
}

/// Builder for [`RuntimeInterface`]
pub struct RuntimeBuilder {
    repositories: RuntimeRepositories,
    gate: Option<Arc<dyn AuthorizationGate>>,
    routing: Option<Arc<dyn RoutingEngine>>,
    publisher: Option<Arc<dyn NotificationPublisher>>,
    clock: Option<Arc<dyn Clock>>,
}

impl RuntimeBuilder {
    pub fn new(repositories: RuntimeRepositories) -> Self {
        Self {
            repositories,
            gate: None,
            routing: None,
            publisher: None,
            clock: None,
        }
    }

    pub fn with_authorization_gate(mut self, gate: Arc<dyn AuthorizationGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_routing_engine(mut self, routing: Arc<dyn RoutingEngine>) -> Self {
        self.routing = Some(routing);
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn NotificationPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Wire the services; unset collaborators fall back to the in-process defaults
    pub fn build(self) -> RuntimeInterface {
        let context = RuntimeContext {
            repositories: self.repositories,
            gate: self
                .gate
                .unwrap_or_else(|| Arc::new(ClaimBasedAuthorizationGate::default())),
            publisher: self
                .publisher
                .unwrap_or_else(|| Arc::new(ChannelEventPublisher::new())),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };
        let routing = self.routing.unwrap_or_else(|| Arc::new(NullRoutingEngine));

        let token_history = TokenHistoryLedger::new(context.clone());
        let flow_nodes = FlowNodeInstanceService::new(context.clone(), token_history.clone(), routing.clone());
        let external_tasks = ExternalTaskService::new(context.clone(), flow_nodes.clone(), routing);
        let process_instances = ProcessInstanceService::new(context.clone());

        RuntimeInterface {
            process_instances,
            flow_nodes,
            external_tasks,
            token_history,
            context,
        }
    }
}
