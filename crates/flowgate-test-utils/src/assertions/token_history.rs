//! Assertion utilities for the token history ledger.

use flowgate_core::{
    FlowNodeInstance, FlowNodeInstanceId, FlowNodeInstanceState, TokenEventType,
    TokenHistoryEntry, TokenHistoryGroup,
};
use serde_json::Value;
use thiserror::Error;

/// Error type for ledger validation failures
#[derive(Debug, Error, PartialEq)]
pub enum LedgerValidationError {
    #[error("Flow node instance {id}: expected entries {expected:?}, got {actual:?}")]
    UnexpectedSequence {
        id: FlowNodeInstanceId,
        expected: Vec<TokenEventType>,
        actual: Vec<TokenEventType>,
    },

    #[error("Flow node instance {id}: expected {event} payload {expected}, got {actual}")]
    PayloadMismatch {
        id: FlowNodeInstanceId,
        event: &'static str,
        expected: Value,
        actual: Value,
    },

    #[error("Flow node instance {0} has no {1} entry")]
    MissingEntry(FlowNodeInstanceId, &'static str),
}

/// Flatten a grouped query result, keeping order within each group
pub fn flatten(group: TokenHistoryGroup) -> Vec<TokenHistoryEntry> {
    group.into_values().flatten().collect()
}

/// Entries of one flow node instance in ledger order
pub fn entries_for<'a>(
    entries: &'a [TokenHistoryEntry],
    id: &FlowNodeInstanceId,
) -> Vec<&'a TokenHistoryEntry> {
    entries
        .iter()
        .filter(|entry| &entry.flow_node_instance_id == id)
        .collect()
}

/// Asserts that an instance has exactly the given entries, in order
pub fn assert_entry_sequence(
    entries: &[TokenHistoryEntry],
    id: &FlowNodeInstanceId,
    expected: &[TokenEventType],
) -> Result<(), LedgerValidationError> {
    let actual: Vec<TokenEventType> = entries_for(entries, id)
        .into_iter()
        .map(|entry| entry.token_event_type)
        .collect();
    if actual != expected {
        return Err(LedgerValidationError::UnexpectedSequence {
            id: id.clone(),
            expected: expected.to_vec(),
            actual,
        });
    }
    Ok(())
}

/// Asserts the entry count each instance's state allows.
///
/// Suspended instances own exactly one onEnter entry. Finished and failed
/// instances own an onEnter followed by an onExit, unless listed in
/// `terminated`, whose instances keep their onEnter alone.
pub fn assert_ledger_consistent(
    entries: &[TokenHistoryEntry],
    instances: &[FlowNodeInstance],
    terminated: &[FlowNodeInstanceId],
) -> Result<(), LedgerValidationError> {
    for instance in instances {
        let expected: &[TokenEventType] = match instance.state {
            FlowNodeInstanceState::Suspended => &[TokenEventType::OnEnter],
            _ if terminated.contains(&instance.id) => &[TokenEventType::OnEnter],
            FlowNodeInstanceState::Finished | FlowNodeInstanceState::Error => {
                &[TokenEventType::OnEnter, TokenEventType::OnExit]
            }
        };
        assert_entry_sequence(entries, &instance.id, expected)?;
    }
    Ok(())
}

/// Asserts the payload recorded for one transition of an instance
pub fn assert_payload(
    entries: &[TokenHistoryEntry],
    id: &FlowNodeInstanceId,
    event: TokenEventType,
    expected: &Value,
) -> Result<(), LedgerValidationError> {
    let entry = entries_for(entries, id)
        .into_iter()
        .find(|entry| entry.token_event_type == event)
        .ok_or_else(|| LedgerValidationError::MissingEntry(id.clone(), event.as_str()))?;
    if entry.payload.as_value() != expected {
        return Err(LedgerValidationError::PayloadMismatch {
            id: id.clone(),
            event: event.as_str(),
            expected: expected.clone(),
            actual: entry.payload.as_value().clone(),
        });
    }
    Ok(())
}
