//! Token history ledger and active tokens

use anyhow::Result;
use flowgate_core::{
    CoreError, CorrelationId, FlowNodeId, FlowNodeType, ProcessInstanceId, ProcessModelId,
    StartProcessInstance, TokenEventType, TokenPayload,
};
use flowgate_test_utils::assertions::{
    assert_entry_sequence, assert_ledger_consistent, assert_payload, flatten,
};
use flowgate_test_utils::fixtures::{default_user, restricted_user, super_admin};
use flowgate_test_utils::TestRuntime;
use serde_json::json;

#[tokio::test]
async fn test_active_token_is_visible_to_owner_only() -> Result<()> {
    let test = TestRuntime::builder().build();
    let owner = default_user();
    let start_token = json!({"orderId": 42});
    let process = test
        .start_process(&owner, "user_task_sample", start_token.clone())
        .await?;
    test.enter_suspended(&process, "UserTask_1", FlowNodeType::UserTask, start_token.clone())
        .await?;
    let ledger = test.runtime.token_history();
    let flow_node_id = FlowNodeId::from("UserTask_1");

    let denied = ledger
        .get_active_tokens_for_flow_node(&restricted_user(), &flow_node_id)
        .await;
    assert!(matches!(denied, Err(CoreError::Forbidden(_))));

    let tokens = ledger
        .get_active_tokens_for_flow_node(&owner, &flow_node_id)
        .await?;
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].identity, owner);
    assert_eq!(tokens[0].payload.value, start_token);
    assert_eq!(tokens[0].process_instance_id, process.id);
    Ok(())
}

#[tokio::test]
async fn test_active_token_queries_cover_every_scope() -> Result<()> {
    let test = TestRuntime::builder().build();
    let owner = default_user();
    let process = test.start_process(&owner, "approval", json!(null)).await?;
    let first = test
        .enter_suspended(&process, "Approve", FlowNodeType::UserTask, json!({"level": 1}))
        .await?;
    test.enter_suspended(&process, "Notify", FlowNodeType::ManualTask, json!({"level": 2}))
        .await?;
    let ledger = test.runtime.token_history();
    let model = ProcessModelId::from("approval");

    assert_eq!(
        ledger
            .get_active_tokens_for_process_instance(&owner, &process.id)
            .await?
            .len(),
        2
    );
    assert_eq!(
        ledger
            .get_active_tokens_for_correlation_and_process_model(
                &owner,
                &process.correlation_id,
                &model
            )
            .await?
            .len(),
        2
    );
    assert_eq!(
        ledger
            .get_active_tokens_for_process_model(&super_admin(), &model)
            .await?
            .len(),
        2
    );

    test.runtime
        .flow_nodes()
        .finish_suspended_task(&owner, &first.id, TokenPayload::null())
        .await?;
    let remaining = ledger
        .get_active_tokens_for_process_instance(&owner, &process.id)
        .await?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].flow_node_id, FlowNodeId::from("Notify"));
    Ok(())
}

#[tokio::test]
async fn test_completed_instances_have_exactly_two_entries() -> Result<()> {
    let test = TestRuntime::builder().build();
    let owner = default_user();
    let process = test.start_process(&owner, "review", json!({"doc": "a"})).await?;

    let mut instances = Vec::new();
    let mut previous = None;
    for n in 0..3 {
        let mut request = flowgate_core::EnterFlowNode::new(
            process.id.clone(),
            format!("Step_{n}"),
            FlowNodeType::UserTask,
            owner.clone(),
            TokenPayload::new(json!({"doc": "a"})),
        );
        if let Some(previous) = previous.take() {
            request = request.after(previous);
        }
        let instance = test.runtime.flow_nodes().enter(request).await?;
        let instance = test
            .runtime
            .flow_nodes()
            .finish_suspended_task(&owner, &instance.id, TokenPayload::new(json!({"step": n})))
            .await?;
        previous = Some(instance.id.clone());
        instances.push(instance);
    }
    let still_open = test
        .enter_suspended(&process, "Step_3", FlowNodeType::UserTask, json!(null))
        .await?;
    instances.push(still_open);

    let group = test
        .runtime
        .token_history()
        .get_tokens_for_process_instance(&owner, &process.id)
        .await?;
    assert_eq!(group.len(), 4);
    let entries = flatten(group);
    assert_eq!(entries.len(), 3 * 2 + 1);
    assert_ledger_consistent(&entries, &instances, &[])?;

    assert_payload(&entries, &instances[1].id, TokenEventType::OnEnter, &json!({"doc": "a"}))?;
    assert_payload(
        &entries,
        &instances[1].id,
        TokenEventType::OnExit,
        &json!({"doc": "a", "step": 1}),
    )?;
    let second_enter = entries
        .iter()
        .find(|e| e.flow_node_instance_id == instances[1].id)
        .map(|e| e.previous_flow_node_instance_id.clone());
    assert_eq!(second_enter, Some(Some(instances[0].id.clone())));
    Ok(())
}

#[tokio::test]
async fn test_queries_group_by_flow_node() -> Result<()> {
    let test = TestRuntime::builder().build();
    let owner = default_user();
    let correlation = CorrelationId::from("corr-1");
    let mut processes = Vec::new();
    for _ in 0..2 {
        let process = test
            .runtime
            .process_instances()
            .start(
                &owner,
                StartProcessInstance::new("billing", TokenPayload::null())
                    .with_correlation(correlation.clone()),
            )
            .await?;
        let task = test
            .enter_suspended(&process, "Invoice", FlowNodeType::UserTask, json!(null))
            .await?;
        test.runtime
            .flow_nodes()
            .finish_suspended_task(&owner, &task.id, TokenPayload::null())
            .await?;
        processes.push(process);
    }
    let ledger = test.runtime.token_history();
    let model = ProcessModelId::from("billing");
    let invoice = FlowNodeId::from("Invoice");

    let by_flow_node = ledger
        .get_tokens_for_flow_node(&owner, &correlation, &model, &invoice)
        .await?;
    assert_eq!(by_flow_node.len(), 1);
    assert_eq!(by_flow_node[&invoice].len(), 4);

    let in_instance = ledger
        .get_tokens_for_flow_node_in_process_instance(&owner, &processes[0].id, &invoice)
        .await?;
    let entries = &in_instance[&invoice];
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].token_event_type, TokenEventType::OnEnter);
    assert_eq!(entries[1].token_event_type, TokenEventType::OnExit);

    let by_correlation = ledger
        .get_tokens_for_correlation_and_process_model(&owner, &correlation, &model)
        .await?;
    assert_eq!(flatten(by_correlation).len(), 4);

    let unknown = ledger
        .get_tokens_for_process_instance(&owner, &ProcessInstanceId::from("missing"))
        .await?;
    assert!(unknown.is_empty());

    let foreign = ledger
        .get_tokens_for_process_instance(&restricted_user(), &processes[0].id)
        .await;
    assert!(matches!(foreign, Err(CoreError::Forbidden(_))));
    Ok(())
}

#[tokio::test]
async fn test_entries_record_the_calling_process() -> Result<()> {
    let test = TestRuntime::builder().build();
    let owner = default_user();
    let parent = test.start_process(&owner, "parent", json!(null)).await?;
    let child = test
        .runtime
        .process_instances()
        .start(
            &owner,
            StartProcessInstance::new("child", TokenPayload::null())
                .with_correlation(parent.correlation_id.clone())
                .with_parent(parent.id.clone()),
        )
        .await?;
    let task = test
        .enter_suspended(&child, "Child_Task", FlowNodeType::UserTask, json!(null))
        .await?;
    test.runtime
        .flow_nodes()
        .finish_suspended_task(&owner, &task.id, TokenPayload::null())
        .await?;

    let entries = flatten(
        test.runtime
            .token_history()
            .get_tokens_for_process_instance(&owner, &child.id)
            .await?,
    );
    assert_entry_sequence(
        &entries,
        &task.id,
        &[TokenEventType::OnEnter, TokenEventType::OnExit],
    )?;
    assert!(entries.iter().all(|e| e.caller.as_ref() == Some(&parent.id)));
    Ok(())
}
