use crate::domain::flow_node_instance::FlowNodeInstance;
use crate::domain::identity::Identity;
use crate::domain::ids::{
    CorrelationId, FlowNodeId, FlowNodeInstanceId, ProcessInstanceId, ProcessModelId,
};
use crate::types::TokenPayload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which transition an entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TokenEventType {
    OnEnter,
    OnExit,
}

impl TokenEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenEventType::OnEnter => "onEnter",
            TokenEventType::OnExit => "onExit",
        }
    }
}

/// Immutable snapshot of a token at an enter or exit transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenHistoryEntry {
    pub flow_node_instance_id: FlowNodeInstanceId,
    pub flow_node_id: FlowNodeId,
    pub token_event_type: TokenEventType,
    pub correlation_id: CorrelationId,
    pub process_model_id: ProcessModelId,
    pub process_instance_id: ProcessInstanceId,
    pub previous_flow_node_instance_id: Option<FlowNodeInstanceId>,
    pub identity: Identity,
    /// Process instance that called the owning process, if any
    pub caller: Option<ProcessInstanceId>,
    pub payload: TokenPayload,
    pub created_at: DateTime<Utc>,
}

impl TokenHistoryEntry {
    /// Snapshot the current token of a flow node instance
    pub fn snapshot(
        instance: &FlowNodeInstance,
        token_event_type: TokenEventType,
        caller: Option<ProcessInstanceId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            flow_node_instance_id: instance.id.clone(),
            flow_node_id: instance.flow_node_id.clone(),
            token_event_type,
            correlation_id: instance.correlation_id.clone(),
            process_model_id: instance.process_model_id.clone(),
            process_instance_id: instance.process_instance_id.clone(),
            previous_flow_node_instance_id: instance.previous_flow_node_instance_id.clone(),
            identity: instance.owner.clone(),
            caller,
            payload: instance.token.clone(),
            created_at: now,
        }
    }
}

/// Entries grouped by definition-level flow node id
pub type TokenHistoryGroup = BTreeMap<FlowNodeId, Vec<TokenHistoryEntry>>;

/// Group entries by flow node id, preserving their order within a group
pub fn group_by_flow_node(entries: Vec<TokenHistoryEntry>) -> TokenHistoryGroup {
    let mut groups = TokenHistoryGroup::new();
    for entry in entries {
        groups
            .entry(entry.flow_node_id.clone())
            .or_default()
            .push(entry);
    }
    groups
}

/// Which slice of the ledger to read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenHistoryQuery {
    /// One flow node within a correlation and process model
    FlowNodeInCorrelation {
        correlation_id: CorrelationId,
        process_model_id: ProcessModelId,
        flow_node_id: FlowNodeId,
    },
    /// One flow node within a process instance
    FlowNodeInProcessInstance {
        process_instance_id: ProcessInstanceId,
        flow_node_id: FlowNodeId,
    },
    /// A whole process instance
    ProcessInstance(ProcessInstanceId),
    /// Every instance of a process model within a correlation
    CorrelationAndProcessModel {
        correlation_id: CorrelationId,
        process_model_id: ProcessModelId,
    },
}

impl TokenHistoryQuery {
    /// Whether an entry falls into this slice
    pub fn matches(&self, entry: &TokenHistoryEntry) -> bool {
        match self {
            TokenHistoryQuery::FlowNodeInCorrelation {
                correlation_id,
                process_model_id,
                flow_node_id,
            } => {
                &entry.correlation_id == correlation_id
                    && &entry.process_model_id == process_model_id
                    && &entry.flow_node_id == flow_node_id
            }
            TokenHistoryQuery::FlowNodeInProcessInstance {
                process_instance_id,
                flow_node_id,
            } => {
                &entry.process_instance_id == process_instance_id
                    && &entry.flow_node_id == flow_node_id
            }
            TokenHistoryQuery::ProcessInstance(process_instance_id) => {
                &entry.process_instance_id == process_instance_id
            }
            TokenHistoryQuery::CorrelationAndProcessModel {
                correlation_id,
                process_model_id,
            } => {
                &entry.correlation_id == correlation_id
                    && &entry.process_model_id == process_model_id
            }
        }
    }
}

/// Current token of a suspended flow node instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveToken {
    pub process_instance_id: ProcessInstanceId,
    pub process_model_id: ProcessModelId,
    pub correlation_id: CorrelationId,
    pub flow_node_id: FlowNodeId,
    pub flow_node_instance_id: FlowNodeInstanceId,
    pub identity: Identity,
    pub payload: TokenPayload,
    pub created_at: DateTime<Utc>,
}

impl From<&FlowNodeInstance> for ActiveToken {
    fn from(instance: &FlowNodeInstance) -> Self {
        Self {
            process_instance_id: instance.process_instance_id.clone(),
            process_model_id: instance.process_model_id.clone(),
            correlation_id: instance.correlation_id.clone(),
            flow_node_id: instance.flow_node_id.clone(),
            flow_node_instance_id: instance.id.clone(),
            identity: instance.owner.clone(),
            payload: instance.token.clone(),
            created_at: instance.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::flow_node_instance::FlowNodeType;
    use serde_json::json;

    fn instance(flow_node_id: &str) -> FlowNodeInstance {
        FlowNodeInstance::suspended(
            FlowNodeId::from(flow_node_id),
            FlowNodeType::UserTask,
            ProcessInstanceId::from("pi-1"),
            ProcessModelId::from("m"),
            CorrelationId::from("c-1"),
            None,
            Identity::new("token", "alice"),
            TokenPayload::new(json!(1)),
            Utc::now(),
        )
    }

    #[test]
    fn test_group_by_flow_node_keeps_order() {
        let a = instance("A");
        let b = instance("B");
        let now = Utc::now();
        let entries = vec![
            TokenHistoryEntry::snapshot(&a, TokenEventType::OnEnter, None, now),
            TokenHistoryEntry::snapshot(&b, TokenEventType::OnEnter, None, now),
            TokenHistoryEntry::snapshot(&a, TokenEventType::OnExit, None, now),
        ];

        let groups = group_by_flow_node(entries);
        assert_eq!(groups.len(), 2);
        let a_entries = &groups[&FlowNodeId::from("A")];
        assert_eq!(a_entries[0].token_event_type, TokenEventType::OnEnter);
        assert_eq!(a_entries[1].token_event_type, TokenEventType::OnExit);
    }

    #[test]
    fn test_query_matches() {
        let entry = TokenHistoryEntry::snapshot(&instance("A"), TokenEventType::OnEnter, None, Utc::now());

        assert!(TokenHistoryQuery::ProcessInstance(ProcessInstanceId::from("pi-1")).matches(&entry));
        assert!(TokenHistoryQuery::FlowNodeInCorrelation {
            correlation_id: CorrelationId::from("c-1"),
            process_model_id: ProcessModelId::from("m"),
            flow_node_id: FlowNodeId::from("A"),
        }
        .matches(&entry));
        assert!(!TokenHistoryQuery::FlowNodeInProcessInstance {
            process_instance_id: ProcessInstanceId::from("pi-1"),
            flow_node_id: FlowNodeId::from("B"),
        }
        .matches(&entry));
    }

    #[test]
    fn test_entry_serializes_event_type_in_camel_case() {
        let entry = TokenHistoryEntry::snapshot(&instance("A"), TokenEventType::OnExit, None, Utc::now());
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["tokenEventType"], "onExit");
        assert_eq!(json["flowNodeId"], "A");
    }
}
