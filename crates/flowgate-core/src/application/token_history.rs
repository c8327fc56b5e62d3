use crate::application::authorization::filter_accessible;
use crate::application::runtime_interface::RuntimeContext;
use crate::domain::flow_node_instance::FlowNodeInstanceFilter;
use crate::domain::identity::Identity;
use crate::domain::ids::{CorrelationId, FlowNodeId, ProcessInstanceId, ProcessModelId};
use crate::domain::token_history::{
    group_by_flow_node, ActiveToken, TokenHistoryEntry, TokenHistoryGroup, TokenHistoryQuery,
};
use crate::CoreError;
use tracing::{debug, instrument};

/// Append-only ledger of token snapshots, plus the current tokens of
/// suspended flow nodes
#[derive(Clone)]
pub struct TokenHistoryLedger {
    context: RuntimeContext,
}

impl TokenHistoryLedger {
    pub fn new(context: RuntimeContext) -> Self {
        Self { context }
    }

    /// Append an entry; entries are never changed afterwards
    pub async fn append(&self, entry: &TokenHistoryEntry) -> Result<(), CoreError> {
        debug!(
            flow_node_instance_id = %entry.flow_node_instance_id,
            token_event_type = entry.token_event_type.as_str(),
            "Appending token history entry"
        );
        self.context.repositories.token_history.append(entry).await
    }

    /// Entries for one flow node of a process model within a correlation
    pub async fn get_tokens_for_flow_node(
        &self,
        identity: &Identity,
        correlation_id: &CorrelationId,
        process_model_id: &ProcessModelId,
        flow_node_id: &FlowNodeId,
    ) -> Result<TokenHistoryGroup, CoreError> {
        self.query(
            identity,
            TokenHistoryQuery::FlowNodeInCorrelation {
                correlation_id: correlation_id.clone(),
                process_model_id: process_model_id.clone(),
                flow_node_id: flow_node_id.clone(),
            },
        )
        .await
    }

    /// Entries for one flow node within a process instance
    pub async fn get_tokens_for_flow_node_in_process_instance(
        &self,
        identity: &Identity,
        process_instance_id: &ProcessInstanceId,
        flow_node_id: &FlowNodeId,
    ) -> Result<TokenHistoryGroup, CoreError> {
        self.query(
            identity,
            TokenHistoryQuery::FlowNodeInProcessInstance {
                process_instance_id: process_instance_id.clone(),
                flow_node_id: flow_node_id.clone(),
            },
        )
        .await
    }

    /// Every entry of a process instance
    pub async fn get_tokens_for_process_instance(
        &self,
        identity: &Identity,
        process_instance_id: &ProcessInstanceId,
    ) -> Result<TokenHistoryGroup, CoreError> {
        self.query(
            identity,
            TokenHistoryQuery::ProcessInstance(process_instance_id.clone()),
        )
        .await
    }

    /// Every entry of a process model's instances within a correlation
    pub async fn get_tokens_for_correlation_and_process_model(
        &self,
        identity: &Identity,
        correlation_id: &CorrelationId,
        process_model_id: &ProcessModelId,
    ) -> Result<TokenHistoryGroup, CoreError> {
        self.query(
            identity,
            TokenHistoryQuery::CorrelationAndProcessModel {
                correlation_id: correlation_id.clone(),
                process_model_id: process_model_id.clone(),
            },
        )
        .await
    }

    #[instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    async fn query(
        &self,
        identity: &Identity,
        query: TokenHistoryQuery,
    ) -> Result<TokenHistoryGroup, CoreError> {
        let entries = self.context.repositories.token_history.find(&query).await?;
        let entries = filter_accessible(
            self.context.gate.as_ref(),
            identity,
            entries,
            |entry| &entry.identity,
        )
        .await?;
        Ok(group_by_flow_node(entries))
    }

    /// Current tokens of suspended instances of a flow node
    pub async fn get_active_tokens_for_flow_node(
        &self,
        identity: &Identity,
        flow_node_id: &FlowNodeId,
    ) -> Result<Vec<ActiveToken>, CoreError> {
        self.active_tokens(
            identity,
            FlowNodeInstanceFilter::suspended().with_flow_node(flow_node_id.clone()),
        )
        .await
    }

    /// Current tokens of a process instance's suspended flow nodes
    pub async fn get_active_tokens_for_process_instance(
        &self,
        identity: &Identity,
        process_instance_id: &ProcessInstanceId,
    ) -> Result<Vec<ActiveToken>, CoreError> {
        self.active_tokens(
            identity,
            FlowNodeInstanceFilter::suspended().with_process_instance(process_instance_id.clone()),
        )
        .await
    }

    /// Current tokens of a process model's suspended flow nodes within a correlation
    pub async fn get_active_tokens_for_correlation_and_process_model(
        &self,
        identity: &Identity,
        correlation_id: &CorrelationId,
        process_model_id: &ProcessModelId,
    ) -> Result<Vec<ActiveToken>, CoreError> {
        self.active_tokens(
            identity,
            FlowNodeInstanceFilter::suspended()
                .with_correlation(correlation_id.clone())
                .with_process_model(process_model_id.clone()),
        )
        .await
    }

    /// Current tokens of every suspended flow node of a process model
    pub async fn get_active_tokens_for_process_model(
        &self,
        identity: &Identity,
        process_model_id: &ProcessModelId,
    ) -> Result<Vec<ActiveToken>, CoreError> {
        self.active_tokens(
            identity,
            FlowNodeInstanceFilter::suspended().with_process_model(process_model_id.clone()),
        )
        .await
    }

    async fn active_tokens(
        &self,
        identity: &Identity,
        filter: FlowNodeInstanceFilter,
    ) -> Result<Vec<ActiveToken>, CoreError> {
        let instances = self
            .context
            .repositories
            .flow_node_instances
            .find(&filter)
            .await?;
        let instances = filter_accessible(
            self.context.gate.as_ref(),
            identity,
            instances,
            |instance| &instance.owner,
        )
        .await?;
        Ok(instances.iter().map(ActiveToken::from).collect())
    }
}
