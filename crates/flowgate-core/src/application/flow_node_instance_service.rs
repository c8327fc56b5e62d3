//! Flow node instance lifecycle manager
//!
//! Every flow node that waits for outside completion enters `suspended`
//! with an onEnter snapshot and leaves exactly once, to `finished` or
//! `error`, with an onExit snapshot. Termination is the one path that
//! leaves an instance with its onEnter entry alone.

use crate::application::authorization::{ensure_can_access, filter_accessible, ForeignAccess};
use crate::application::routing::{RoutingEngine, RoutingOutcome};
use crate::application::runtime_interface::RuntimeContext;
use crate::application::token_history::TokenHistoryLedger;
use crate::domain::events::{
    FlowNodeFailed, FlowNodeFinished, FlowNodeSuspended, ProcessInstanceFailed,
    ProcessInstanceFinished, ProcessInstanceTerminated,
};
use crate::domain::external_task::{ExternalTask, ExternalTaskState};
use crate::domain::flow_node_instance::{
    FlowNodeInstance, FlowNodeInstanceFilter, FlowNodeInstanceState, FlowNodeType,
};
use crate::domain::identity::Identity;
use crate::domain::ids::{
    CorrelationId, FlowNodeId, FlowNodeInstanceId, ProcessInstanceId, ProcessModelId,
};
use crate::domain::process_instance::{ProcessInstance, ProcessInstanceState};
use crate::domain::token_history::{TokenEventType, TokenHistoryEntry};
use crate::types::{Page, Pagination, TokenPayload};
use crate::CoreError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Input for entering a flow node
#[derive(Debug, Clone)]
pub struct EnterFlowNode {
    pub process_instance_id: ProcessInstanceId,
    pub flow_node_id: FlowNodeId,
    pub flow_node_type: FlowNodeType,
    pub previous_flow_node_instance_id: Option<FlowNodeInstanceId>,
    pub identity: Identity,
    pub payload: TokenPayload,
    /// Required for external tasks
    pub topic: Option<String>,
}

impl EnterFlowNode {
    pub fn new(
        process_instance_id: ProcessInstanceId,
        flow_node_id: impl Into<FlowNodeId>,
        flow_node_type: FlowNodeType,
        identity: Identity,
        payload: TokenPayload,
    ) -> Self {
        Self {
            process_instance_id,
            flow_node_id: flow_node_id.into(),
            flow_node_type,
            previous_flow_node_instance_id: None,
            identity,
            payload,
            topic: None,
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn after(mut self, previous: FlowNodeInstanceId) -> Self {
        self.previous_flow_node_instance_id = Some(previous);
        self
    }
}

/// Which suspended flow node instances to list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuspendedTaskQuery {
    ByCorrelation(CorrelationId),
    ByProcessModel(ProcessModelId),
    ByProcessInstance(ProcessInstanceId),
    ByFlowNode(FlowNodeId),
    /// Tasks owned by the calling identity
    ByIdentity,
}

impl SuspendedTaskQuery {
    fn to_filter(&self, identity: &Identity) -> FlowNodeInstanceFilter {
        let filter = FlowNodeInstanceFilter::suspended();
        match self {
            SuspendedTaskQuery::ByCorrelation(id) => filter.with_correlation(id.clone()),
            SuspendedTaskQuery::ByProcessModel(id) => filter.with_process_model(id.clone()),
            SuspendedTaskQuery::ByProcessInstance(id) => filter.with_process_instance(id.clone()),
            SuspendedTaskQuery::ByFlowNode(id) => filter.with_flow_node(id.clone()),
            SuspendedTaskQuery::ByIdentity => filter.with_owner(identity.user_id.clone()),
        }
    }
}

/// Lifecycle manager for flow node instances
#[derive(Clone)]
pub struct FlowNodeInstanceService {
    context: RuntimeContext,
    ledger: TokenHistoryLedger,
    routing: Arc<dyn RoutingEngine>,
}

impl FlowNodeInstanceService {
    pub fn new(
        context: RuntimeContext,
        ledger: TokenHistoryLedger,
        routing: Arc<dyn RoutingEngine>,
    ) -> Self {
        Self {
            context,
            ledger,
            routing,
        }
    }

    /// Create a suspended flow node instance and record its onEnter token
    ///
    /// External task nodes also create their pending external task.
    #[instrument(skip(self, request), fields(
        process_instance_id = %request.process_instance_id,
        flow_node_id = %request.flow_node_id,
    ))]
    pub async fn enter(&self, request: EnterFlowNode) -> Result<FlowNodeInstance, CoreError> {
        let process_instance = self.load_process_instance(&request.process_instance_id).await?;
        ensure_can_access(
            self.context.gate.as_ref(),
            &request.identity,
            &process_instance.owner,
            &format!("Process instance {}", process_instance.id),
            ForeignAccess::Mask,
        )
        .await?;
        if !process_instance.is_running() {
            return Err(CoreError::InvalidState(format!(
                "Process instance {} is {}",
                process_instance.id, process_instance.state
            )));
        }

        let topic = match (request.flow_node_type, request.topic) {
            (FlowNodeType::ExternalTask, None) => {
                return Err(CoreError::BadRequest(format!(
                    "External task {} has no topic",
                    request.flow_node_id
                )))
            }
            (FlowNodeType::ExternalTask, Some(topic)) if topic.trim().is_empty() => {
                return Err(CoreError::BadRequest(format!(
                    "External task {} has an empty topic",
                    request.flow_node_id
                )))
            }
            (_, topic) => topic,
        };

        let now = self.context.clock.now();
        let instance = FlowNodeInstance::suspended(
            request.flow_node_id,
            request.flow_node_type,
            process_instance.id.clone(),
            process_instance.process_model_id.clone(),
            process_instance.correlation_id.clone(),
            request.previous_flow_node_instance_id,
            request.identity,
            request.payload,
            now,
        );

        self.context
            .repositories
            .flow_node_instances
            .create(&instance)
            .await?;
        self.ledger
            .append(&TokenHistoryEntry::snapshot(
                &instance,
                TokenEventType::OnEnter,
                process_instance.parent_process_instance_id.clone(),
                now,
            ))
            .await?;

        if let (FlowNodeType::ExternalTask, Some(topic)) = (instance.flow_node_type, topic) {
            let task = ExternalTask::new(
                instance.id.clone(),
                instance.process_instance_id.clone(),
                instance.process_model_id.clone(),
                instance.correlation_id.clone(),
                topic,
                instance.token.clone(),
                now,
            );
            self.context.repositories.external_tasks.create(&task).await?;
            debug!(external_task_id = %task.id, topic = %task.topic, "External task created");
        }

        self.context
            .publish(FlowNodeSuspended {
                process_instance_id: instance.process_instance_id.clone(),
                correlation_id: instance.correlation_id.clone(),
                flow_node_instance_id: instance.id.clone(),
                flow_node_id: instance.flow_node_id.clone(),
                flow_node_type: instance.flow_node_type,
                identity: instance.owner.clone(),
                timestamp: now,
            })
            .await;

        info!(flow_node_instance_id = %instance.id, flow_node_type = %instance.flow_node_type, "Flow node suspended");
        Ok(instance)
    }

    /// Finish a suspended instance, record its onExit token and hand it
    /// back to the routing engine
    #[instrument(skip(self, result))]
    pub async fn exit(
        &self,
        flow_node_instance_id: &FlowNodeInstanceId,
        result: TokenPayload,
    ) -> Result<FlowNodeInstance, CoreError> {
        let mut instance = self.load(flow_node_instance_id).await?;
        let now = self.context.clock.now();
        instance.finish(&result, now)?;
        self.save_transition(&instance).await?;
        self.write_exit_token(&instance).await?;

        self.context
            .publish(FlowNodeFinished {
                process_instance_id: instance.process_instance_id.clone(),
                correlation_id: instance.correlation_id.clone(),
                flow_node_instance_id: instance.id.clone(),
                flow_node_id: instance.flow_node_id.clone(),
                token: instance.token.clone(),
                timestamp: now,
            })
            .await;
        info!(flow_node_instance_id = %instance.id, "Flow node finished");

        if !self.is_process_running(&instance.process_instance_id).await? {
            debug!(process_instance_id = %instance.process_instance_id, "Process instance already ended; not resuming");
            return Ok(instance);
        }
        match self.routing.resume(&instance).await? {
            RoutingOutcome::Continued => {}
            RoutingOutcome::ProcessEnded(end_token) => {
                self.finish_process_instance(&instance.process_instance_id, end_token)
                    .await?;
            }
        }

        Ok(instance)
    }

    /// Move a suspended instance to `error` and record its onExit token
    #[instrument(skip(self, error))]
    pub async fn fail(
        &self,
        flow_node_instance_id: &FlowNodeInstanceId,
        error: impl Into<String>,
    ) -> Result<FlowNodeInstance, CoreError> {
        let error = error.into();
        let mut instance = self.load(flow_node_instance_id).await?;
        let now = self.context.clock.now();
        instance.fail(error.clone(), now)?;
        self.save_transition(&instance).await?;
        self.write_exit_token(&instance).await?;

        self.context
            .publish(FlowNodeFailed {
                process_instance_id: instance.process_instance_id.clone(),
                correlation_id: instance.correlation_id.clone(),
                flow_node_instance_id: instance.id.clone(),
                flow_node_id: instance.flow_node_id.clone(),
                error: error.clone(),
                timestamp: now,
            })
            .await;
        warn!(flow_node_instance_id = %instance.id, error = %error, "Flow node failed");
        Ok(instance)
    }

    /// Complete a suspended user task, manual task, empty activity or event
    pub async fn finish_suspended_task(
        &self,
        identity: &Identity,
        flow_node_instance_id: &FlowNodeInstanceId,
        result: TokenPayload,
    ) -> Result<FlowNodeInstance, CoreError> {
        let instance = self.get(identity, flow_node_instance_id).await?;
        if instance.flow_node_type.is_external_task() {
            return Err(CoreError::BadRequest(format!(
                "Flow node instance {} is an external task; finish it through the external task API",
                instance.id
            )));
        }
        let process_instance = self.load_process_instance(&instance.process_instance_id).await?;
        if !process_instance.is_running() {
            return Err(CoreError::InvalidState(format!(
                "Process instance {} is {}",
                process_instance.id, process_instance.state
            )));
        }
        self.exit(&instance.id, result).await
    }

    /// Force every suspended flow node of a process instance into `error`
    /// and the process instance itself into `error`
    #[instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn terminate(
        &self,
        identity: &Identity,
        process_instance_id: &ProcessInstanceId,
    ) -> Result<ProcessInstance, CoreError> {
        let mut process_instance = self.load_process_instance(process_instance_id).await?;
        ensure_can_access(
            self.context.gate.as_ref(),
            identity,
            &process_instance.owner,
            &format!("Process instance {}", process_instance_id),
            ForeignAccess::Mask,
        )
        .await?;

        let now = self.context.clock.now();
        let reason = format!("Process instance terminated by {}", identity.user_id);
        process_instance.fail(reason.clone(), now)?;

        self.fail_suspended_nodes(process_instance_id, &reason, now)
            .await?;

        if !self
            .context
            .repositories
            .process_instances
            .save_if_state(&process_instance, ProcessInstanceState::Running)
            .await?
        {
            let current = self.load_process_instance(process_instance_id).await?;
            return Err(CoreError::InvalidState(format!(
                "Process instance {} is {}",
                process_instance_id, current.state
            )));
        }

        self.context
            .publish(ProcessInstanceTerminated {
                process_instance_id: process_instance.id.clone(),
                correlation_id: process_instance.correlation_id.clone(),
                terminated_by: identity.clone(),
                timestamp: now,
            })
            .await;
        info!(process_instance_id = %process_instance.id, "Process instance terminated");
        Ok(process_instance)
    }

    /// Fault a running process instance and every flow node still
    /// suspended in it; returns false if it already ended
    pub async fn fail_process_instance(
        &self,
        process_instance_id: &ProcessInstanceId,
        error: impl Into<String>,
    ) -> Result<bool, CoreError> {
        let error = error.into();
        let mut process_instance = self.load_process_instance(process_instance_id).await?;
        if !process_instance.is_running() {
            warn!(process_instance_id = %process_instance_id, state = %process_instance.state, "Process instance already ended");
            return Ok(false);
        }

        let now = self.context.clock.now();
        process_instance.fail(error.clone(), now)?;
        if !self
            .context
            .repositories
            .process_instances
            .save_if_state(&process_instance, ProcessInstanceState::Running)
            .await?
        {
            return Ok(false);
        }
        self.fail_suspended_nodes(process_instance_id, &error, now)
            .await?;

        self.context
            .publish(ProcessInstanceFailed {
                process_instance_id: process_instance.id.clone(),
                correlation_id: process_instance.correlation_id.clone(),
                error: error.clone(),
                timestamp: now,
            })
            .await;
        warn!(process_instance_id = %process_instance_id, error = %error, "Process instance failed");
        Ok(true)
    }

    /// Look up one flow node instance the caller owns
    pub async fn get(
        &self,
        identity: &Identity,
        flow_node_instance_id: &FlowNodeInstanceId,
    ) -> Result<FlowNodeInstance, CoreError> {
        self.context.gate.ensure_authenticated(identity).await?;
        let instance = self.load(flow_node_instance_id).await?;
        ensure_can_access(
            self.context.gate.as_ref(),
            identity,
            &instance.owner,
            &format!("Flow node instance {}", flow_node_instance_id),
            ForeignAccess::Forbid,
        )
        .await?;
        Ok(instance)
    }

    /// List suspended flow node instances visible to the caller
    pub async fn get_suspended_tasks(
        &self,
        identity: &Identity,
        query: &SuspendedTaskQuery,
        pagination: Pagination,
    ) -> Result<Page<FlowNodeInstance>, CoreError> {
        self.context.gate.ensure_authenticated(identity).await?;
        let instances = self
            .context
            .repositories
            .flow_node_instances
            .find(&query.to_filter(identity))
            .await?;
        let visible = filter_accessible(
            self.context.gate.as_ref(),
            identity,
            instances,
            |instance| &instance.owner,
        )
        .await?;
        Ok(Page::paginate(visible, pagination))
    }

    async fn load(&self, id: &FlowNodeInstanceId) -> Result<FlowNodeInstance, CoreError> {
        self.context
            .repositories
            .flow_node_instances
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Flow node instance {} not found", id)))
    }

    async fn load_process_instance(
        &self,
        id: &ProcessInstanceId,
    ) -> Result<ProcessInstance, CoreError> {
        self.context
            .repositories
            .process_instances
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Process instance {} not found", id)))
    }

    async fn save_transition(&self, instance: &FlowNodeInstance) -> Result<(), CoreError> {
        if self
            .context
            .repositories
            .flow_node_instances
            .save_if_state(instance, FlowNodeInstanceState::Suspended)
            .await?
        {
            return Ok(());
        }
        let current = self.load(&instance.id).await?;
        Err(CoreError::InvalidState(format!(
            "Flow node instance {} is already {}",
            instance.id, current.state
        )))
    }

    async fn write_exit_token(&self, instance: &FlowNodeInstance) -> Result<(), CoreError> {
        let caller = self
            .context
            .repositories
            .process_instances
            .find_by_id(&instance.process_instance_id)
            .await?
            .and_then(|pi| pi.parent_process_instance_id);
        self.ledger
            .append(&TokenHistoryEntry::snapshot(
                instance,
                TokenEventType::OnExit,
                caller,
                instance.updated_at,
            ))
            .await
    }

    /// Force the suspended flow nodes of a process instance into `error`
    ///
    /// No onExit entry is written. An external task is aborted before its
    /// node moves; if a worker completed the task first, the node is left
    /// to that worker's exit.
    async fn fail_suspended_nodes(
        &self,
        process_instance_id: &ProcessInstanceId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let suspended = self
            .context
            .repositories
            .flow_node_instances
            .find(&FlowNodeInstanceFilter::suspended().with_process_instance(process_instance_id.clone()))
            .await?;

        for mut instance in suspended {
            if instance.flow_node_type.is_external_task()
                && !self.abort_external_task(&instance.id, reason, now).await?
            {
                debug!(flow_node_instance_id = %instance.id, "External task completed by its worker first");
                continue;
            }
            if instance.fail(reason.to_string(), now).is_err() {
                continue;
            }
            if !self
                .context
                .repositories
                .flow_node_instances
                .save_if_state(&instance, FlowNodeInstanceState::Suspended)
                .await?
            {
                debug!(flow_node_instance_id = %instance.id, "Flow node left suspended state concurrently");
                continue;
            }
            self.context
                .publish(FlowNodeFailed {
                    process_instance_id: instance.process_instance_id.clone(),
                    correlation_id: instance.correlation_id.clone(),
                    flow_node_instance_id: instance.id.clone(),
                    flow_node_id: instance.flow_node_id.clone(),
                    error: reason.to_string(),
                    timestamp: now,
                })
                .await;
        }
        Ok(())
    }

    /// Returns false when a worker finished the task before it could be aborted
    async fn abort_external_task(
        &self,
        flow_node_instance_id: &FlowNodeInstanceId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        let repo = &self.context.repositories.external_tasks;
        // retry while the lease moves between pending and locked underneath us
        loop {
            let Some(mut task) = repo.find_by_flow_node_instance(flow_node_instance_id).await? else {
                return Ok(true);
            };
            let expected_state = task.state;
            if expected_state == ExternalTaskState::Finished {
                return Ok(false);
            }
            let expected_worker = task.worker_id.clone();
            task.abort(reason, now)?;
            if repo
                .save_if_unchanged(&task, expected_state, expected_worker.as_deref())
                .await?
            {
                debug!(external_task_id = %task.id, "External task aborted");
                return Ok(true);
            }
        }
    }

    /// Whether the process instance is still running
    pub(crate) async fn is_process_running(
        &self,
        process_instance_id: &ProcessInstanceId,
    ) -> Result<bool, CoreError> {
        Ok(self
            .load_process_instance(process_instance_id)
            .await?
            .is_running())
    }

    async fn finish_process_instance(
        &self,
        process_instance_id: &ProcessInstanceId,
        end_token: TokenPayload,
    ) -> Result<(), CoreError> {
        let mut process_instance = self.load_process_instance(process_instance_id).await?;
        let now = self.context.clock.now();
        process_instance.finish(end_token.clone(), now)?;
        if !self
            .context
            .repositories
            .process_instances
            .save_if_state(&process_instance, ProcessInstanceState::Running)
            .await?
        {
            return Err(CoreError::InvalidState(format!(
                "Process instance {} ended concurrently",
                process_instance_id
            )));
        }

        self.context
            .publish(ProcessInstanceFinished {
                process_instance_id: process_instance.id.clone(),
                correlation_id: process_instance.correlation_id.clone(),
                result: end_token,
                timestamp: now,
            })
            .await;
        info!(process_instance_id = %process_instance_id, "Process instance finished");
        Ok(())
    }
}
