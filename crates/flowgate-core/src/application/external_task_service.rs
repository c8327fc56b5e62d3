//! External task lease queue
//!
//! Workers poll a topic, receive exclusive time-bounded leases and
//! complete each task exactly once. Reservation atomicity lives in the
//! store; this service checks claims, validates ownership and drives the
//! lifecycle manager when a task completes.

use crate::application::flow_node_instance_service::FlowNodeInstanceService;
use crate::application::routing::{ErrorRouting, RoutingEngine};
use crate::application::runtime_interface::RuntimeContext;
use crate::domain::events::{ExternalTaskFinished, ExternalTaskLocked};
use crate::domain::external_task::{
    validate_lock_duration, ExternalTask, ExternalTaskError, ExternalTaskState, LockRequest,
};
use crate::domain::identity::Identity;
use crate::domain::ids::ExternalTaskId;
use crate::types::TokenPayload;
use crate::CoreError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Lease queue for external tasks
#[derive(Clone)]
pub struct ExternalTaskService {
    context: RuntimeContext,
    lifecycle: FlowNodeInstanceService,
    routing: Arc<dyn RoutingEngine>,
}

impl ExternalTaskService {
    pub fn new(
        context: RuntimeContext,
        lifecycle: FlowNodeInstanceService,
        routing: Arc<dyn RoutingEngine>,
    ) -> Self {
        Self {
            context,
            lifecycle,
            routing,
        }
    }

    /// Lock up to `max_tasks` pending tasks of a topic for one worker
    ///
    /// An empty result is a valid answer, never an error.
    #[instrument(skip(self, identity, request), fields(worker_id = %request.worker_id, topic = %request.topic))]
    pub async fn fetch_and_lock(
        &self,
        identity: &Identity,
        request: &LockRequest,
    ) -> Result<Vec<ExternalTask>, CoreError> {
        self.context.gate.ensure_external_task_access(identity).await?;
        request.validate()?;
        if request.max_tasks == 0 {
            return Ok(Vec::new());
        }

        let now = self.context.clock.now();
        let tasks = self
            .context
            .repositories
            .external_tasks
            .fetch_and_lock(request, now)
            .await?;

        for task in &tasks {
            if let Some(lock_expiration_time) = task.lock_expiration_time {
                self.context
                    .publish(ExternalTaskLocked {
                        process_instance_id: task.process_instance_id.clone(),
                        external_task_id: task.id.clone(),
                        topic: task.topic.clone(),
                        worker_id: request.worker_id.clone(),
                        lock_expiration_time,
                        timestamp: now,
                    })
                    .await;
            }
        }

        debug!(locked = tasks.len(), "Fetch and lock completed");
        Ok(tasks)
    }

    /// Set the lease end of a locked task to `now + duration`
    #[instrument(skip(self, identity))]
    pub async fn extend_lock(
        &self,
        identity: &Identity,
        worker_id: &str,
        external_task_id: &ExternalTaskId,
        duration: Duration,
    ) -> Result<ExternalTask, CoreError> {
        self.context.gate.ensure_external_task_access(identity).await?;
        validate_lock_duration(duration)?;
        let mut task = self.load(external_task_id).await?;
        task.extend_lock(worker_id, duration, self.context.clock.now())?;
        self.save_locked(&task, worker_id).await?;
        debug!(lock_expiration_time = ?task.lock_expiration_time, "Lock extended");
        Ok(task)
    }

    /// Complete a task with a result and resume its flow node
    #[instrument(skip(self, identity, result))]
    pub async fn finish(
        &self,
        identity: &Identity,
        worker_id: &str,
        external_task_id: &ExternalTaskId,
        result: TokenPayload,
    ) -> Result<ExternalTask, CoreError> {
        self.context.gate.ensure_external_task_access(identity).await?;
        let mut task = self.load(external_task_id).await?;
        task.finish(worker_id, result.clone(), self.context.clock.now())?;
        self.save_locked(&task, worker_id).await?;
        self.publish_finished(&task).await;

        self.lifecycle.exit(&task.flow_node_instance_id, result).await?;
        info!("External task finished");
        Ok(task)
    }

    /// Complete a task with a business error
    ///
    /// The routing engine may catch it with a boundary event; otherwise
    /// the process instance ends in `error`.
    #[instrument(skip(self, identity, error_message))]
    pub async fn handle_bpmn_error(
        &self,
        identity: &Identity,
        worker_id: &str,
        external_task_id: &ExternalTaskId,
        error_code: &str,
        error_message: &str,
    ) -> Result<ExternalTask, CoreError> {
        self.context.gate.ensure_external_task_access(identity).await?;
        if error_code.trim().is_empty() {
            return Err(CoreError::BadRequest("errorCode must not be empty".to_string()));
        }

        let error = ExternalTaskError::Bpmn {
            code: error_code.to_string(),
            message: error_message.to_string(),
        };
        let mut task = self.load(external_task_id).await?;
        task.finish_with_error(worker_id, error.clone(), self.context.clock.now())?;
        self.save_locked(&task, worker_id).await?;
        self.publish_finished(&task).await;

        let instance = self
            .lifecycle
            .fail(&task.flow_node_instance_id, error.to_string())
            .await?;
        if !self.lifecycle.is_process_running(&task.process_instance_id).await? {
            debug!(error_code, "Process instance already ended; BPMN error not routed");
            return Ok(task);
        }
        match self.routing.route_bpmn_error(&instance, &error).await? {
            ErrorRouting::Caught => {
                info!(error_code, "BPMN error caught by boundary event");
            }
            ErrorRouting::Uncaught => {
                warn!(error_code, "BPMN error not caught");
                self.lifecycle
                    .fail_process_instance(&task.process_instance_id, error.to_string())
                    .await?;
            }
        }
        Ok(task)
    }

    /// Complete a task with a technical failure; always faults the process instance
    #[instrument(skip(self, identity, error_details))]
    pub async fn handle_service_error(
        &self,
        identity: &Identity,
        worker_id: &str,
        external_task_id: &ExternalTaskId,
        error_message: &str,
        error_details: serde_json::Value,
    ) -> Result<ExternalTask, CoreError> {
        self.context.gate.ensure_external_task_access(identity).await?;
        let error = ExternalTaskError::Service {
            message: error_message.to_string(),
            details: error_details,
        };
        let mut task = self.load(external_task_id).await?;
        task.finish_with_error(worker_id, error.clone(), self.context.clock.now())?;
        self.save_locked(&task, worker_id).await?;
        self.publish_finished(&task).await;

        self.lifecycle
            .fail(&task.flow_node_instance_id, error.to_string())
            .await?;
        self.lifecycle
            .fail_process_instance(&task.process_instance_id, error.to_string())
            .await?;
        Ok(task)
    }

    /// Look up a single task
    pub async fn get(
        &self,
        identity: &Identity,
        external_task_id: &ExternalTaskId,
    ) -> Result<ExternalTask, CoreError> {
        self.context.gate.ensure_external_task_access(identity).await?;
        self.load(external_task_id).await
    }

    /// Return every locked task whose lease ran out to `pending`
    #[instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn reclaim_expired_locks(
        &self,
        identity: &Identity,
    ) -> Result<Vec<ExternalTask>, CoreError> {
        self.context.gate.ensure_super_admin(identity).await?;
        let reclaimed = self
            .context
            .repositories
            .external_tasks
            .reclaim_expired(self.context.clock.now())
            .await?;
        if !reclaimed.is_empty() {
            info!(count = reclaimed.len(), "Expired locks reclaimed");
        }
        Ok(reclaimed)
    }

    async fn load(&self, id: &ExternalTaskId) -> Result<ExternalTask, CoreError> {
        self.context
            .repositories
            .external_tasks
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("External task {} not found", id)))
    }

    async fn save_locked(&self, task: &ExternalTask, worker_id: &str) -> Result<(), CoreError> {
        if self
            .context
            .repositories
            .external_tasks
            .save_if_unchanged(task, ExternalTaskState::Locked, Some(worker_id))
            .await?
        {
            return Ok(());
        }
        // lost the race; report what the winner left behind
        let current = self.load(&task.id).await?;
        current.ensure_locked_by(worker_id)?;
        Err(CoreError::Conflict(format!(
            "External task {} was modified concurrently",
            task.id
        )))
    }

    async fn publish_finished(&self, task: &ExternalTask) {
        self.context
            .publish(ExternalTaskFinished {
                process_instance_id: task.process_instance_id.clone(),
                external_task_id: task.id.clone(),
                worker_id: task.worker_id.clone(),
                error: task.error.clone(),
                timestamp: task.finished_at.unwrap_or_else(|| self.context.clock.now()),
            })
            .await;
    }
}
