//!
//! Flowgate Core - lifecycle, lease queue and token history for the
//! Flowgate process runtime
//!
//! This crate defines the domain model, the repository ports that state
//! stores implement, and the services that drive flow node instances
//! through suspend and resume. It never names a concrete store.

#![forbid(unsafe_code)]

/// Domain layer - entities, value objects and repository ports
pub mod domain;

/// Application services - lifecycle manager, lease queue, ledger
pub mod application;

/// Core types and traits
pub mod types;

/// Error types
pub mod error;

pub use error::CoreError;
pub use types::{Clock, Page, Pagination, SystemClock, TokenPayload};

pub use domain::events::DomainEvent;
pub use domain::external_task::{
    ExternalTask, ExternalTaskError, ExternalTaskState, LockRequest, MAX_LOCK_DURATION,
};
pub use domain::flow_node_instance::{
    FlowNodeInstance, FlowNodeInstanceFilter, FlowNodeInstanceState, FlowNodeType,
};
pub use domain::identity::Identity;
pub use domain::ids::{
    CorrelationId, ExternalTaskId, FlowNodeId, FlowNodeInstanceId, ProcessInstanceId,
    ProcessModelId,
};
pub use domain::process_instance::{ProcessInstance, ProcessInstanceState};
pub use domain::repository::{
    ExternalTaskRepository, FlowNodeInstanceRepository, ProcessInstanceRepository,
    TokenHistoryRepository,
};
pub use domain::token_history::{
    ActiveToken, TokenEventType, TokenHistoryEntry, TokenHistoryGroup, TokenHistoryQuery,
};

pub use application::authorization::{AuthorizationGate, ClaimBasedAuthorizationGate};
pub use application::external_task_service::ExternalTaskService;
pub use application::flow_node_instance_service::{
    EnterFlowNode, FlowNodeInstanceService, SuspendedTaskQuery,
};
pub use application::notification::{
    ChannelEventPublisher, NotificationPublisher, NullPublisher, SharedEvent, Subscription,
    SubscriptionHandle,
};
pub use application::process_instance_service::{ProcessInstanceService, StartProcessInstance};
pub use application::routing::{ErrorRouting, NullRoutingEngine, RoutingEngine, RoutingOutcome};
pub use application::runtime_interface::{
    RuntimeBuilder, RuntimeContext, RuntimeInterface, RuntimeRepositories,
};
pub use application::token_history::TokenHistoryLedger;
