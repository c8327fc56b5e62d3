use crate::application::authorization::{ensure_can_access, filter_accessible, ForeignAccess};
use crate::application::runtime_interface::RuntimeContext;
use crate::domain::events::ProcessInstanceStarted;
use crate::domain::identity::Identity;
use crate::domain::ids::{CorrelationId, ProcessInstanceId, ProcessModelId};
use crate::domain::process_instance::ProcessInstance;
use crate::types::{Page, Pagination, TokenPayload};
use crate::CoreError;
use tracing::{info, instrument};

/// Input for starting a process instance
#[derive(Debug, Clone)]
pub struct StartProcessInstance {
    pub process_model_id: ProcessModelId,
    /// A new correlation is created when unset
    pub correlation_id: Option<CorrelationId>,
    pub start_token: TokenPayload,
    pub parent_process_instance_id: Option<ProcessInstanceId>,
}

impl StartProcessInstance {
    pub fn new(process_model_id: impl Into<ProcessModelId>, start_token: TokenPayload) -> Self {
        Self {
            process_model_id: process_model_id.into(),
            correlation_id: None,
            start_token,
            parent_process_instance_id: None,
        }
    }

    pub fn with_correlation(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_parent(mut self, parent: ProcessInstanceId) -> Self {
        self.parent_process_instance_id = Some(parent);
        self
    }
}

/// Starts process instances and answers lookups on them
#[derive(Clone)]
pub struct ProcessInstanceService {
    context: RuntimeContext,
}

impl ProcessInstanceService {
    pub fn new(context: RuntimeContext) -> Self {
        Self { context }
    }

    /// Create a running process instance owned by the caller
    #[instrument(skip(self, identity, request), fields(process_model_id = %request.process_model_id))]
    pub async fn start(
        &self,
        identity: &Identity,
        request: StartProcessInstance,
    ) -> Result<ProcessInstance, CoreError> {
        self.context.gate.ensure_authenticated(identity).await?;
        if request.process_model_id.as_str().trim().is_empty() {
            return Err(CoreError::BadRequest(
                "processModelId must not be empty".to_string(),
            ));
        }

        let now = self.context.clock.now();
        let mut instance = ProcessInstance::new(
            request.process_model_id,
            request.correlation_id.unwrap_or_else(CorrelationId::generate),
            identity.clone(),
            request.start_token,
            now,
        );
        instance.parent_process_instance_id = request.parent_process_instance_id;

        self.context
            .repositories
            .process_instances
            .create(&instance)
            .await?;

        self.context
            .publish(ProcessInstanceStarted {
                process_instance_id: instance.id.clone(),
                process_model_id: instance.process_model_id.clone(),
                correlation_id: instance.correlation_id.clone(),
                identity: identity.clone(),
                timestamp: now,
            })
            .await;

        info!(process_instance_id = %instance.id, correlation_id = %instance.correlation_id, "Process instance started");
        Ok(instance)
    }

    /// Look up a process instance; a foreign owner reads as `NotFound`
    pub async fn get_by_id(
        &self,
        identity: &Identity,
        process_instance_id: &ProcessInstanceId,
    ) -> Result<ProcessInstance, CoreError> {
        self.context.gate.ensure_authenticated(identity).await?;
        let instance = self
            .context
            .repositories
            .process_instances
            .find_by_id(process_instance_id)
            .await?
            .ok_or_else(|| {
                CoreError::NotFound(format!("Process instance {} not found", process_instance_id))
            })?;
        ensure_can_access(
            self.context.gate.as_ref(),
            identity,
            &instance.owner,
            &format!("Process instance {}", process_instance_id),
            ForeignAccess::Mask,
        )
        .await?;
        Ok(instance)
    }

    /// Instances of a correlation visible to the caller
    ///
    /// An unknown correlation, or one whose instances all belong to
    /// someone else, reads as `NotFound`.
    pub async fn get_by_correlation(
        &self,
        identity: &Identity,
        correlation_id: &CorrelationId,
    ) -> Result<Vec<ProcessInstance>, CoreError> {
        self.context.gate.ensure_authenticated(identity).await?;
        let instances = self
            .context
            .repositories
            .process_instances
            .find_by_correlation(correlation_id)
            .await?;

        let mut visible = Vec::with_capacity(instances.len());
        for instance in instances {
            if self.context.gate.can_access(identity, &instance.owner).await? {
                visible.push(instance);
            }
        }
        if visible.is_empty() {
            return Err(CoreError::NotFound(format!(
                "Correlation {} not found",
                correlation_id
            )));
        }
        Ok(visible)
    }

    /// Paginated instances of a process model visible to the caller
    pub async fn get_by_process_model(
        &self,
        identity: &Identity,
        process_model_id: &ProcessModelId,
        pagination: Pagination,
    ) -> Result<Page<ProcessInstance>, CoreError> {
        let instances = self
            .context
            .repositories
            .process_instances
            .find_by_process_model(process_model_id)
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
}
