//! Flow node lifecycle, termination and suspended-task queries

use anyhow::Result;
use flowgate_core::{
    CoreError, CorrelationId, EnterFlowNode, ExternalTaskError, ExternalTaskState,
    FlowNodeId, FlowNodeInstanceState, FlowNodeType, Identity, LockRequest, Pagination,
    ProcessInstanceState, ProcessModelId, SuspendedTaskQuery, TokenEventType, TokenPayload,
};
use flowgate_integration_tests::utils::suspend_at_external_task;
use flowgate_test_utils::assertions::{assert_entry_sequence, assert_ledger_consistent, flatten};
use flowgate_test_utils::fixtures::{default_user, restricted_user, super_admin, worker};
use flowgate_test_utils::{StaticRoutingEngine, TestRuntime};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_user_task_exits_once() -> Result<()> {
    let test = TestRuntime::builder().build();
    let owner = default_user();
    let process = test
        .start_process(&owner, "user_task_sample", json!({"customer": "c-1"}))
        .await?;
    let task = test
        .enter_suspended(&process, "UserTask_1", FlowNodeType::UserTask, json!({"customer": "c-1"}))
        .await?;

    let finished = test
        .runtime
        .flow_nodes()
        .finish_suspended_task(&owner, &task.id, TokenPayload::new(json!({"approved": true})))
        .await?;
    assert_eq!(finished.state, FlowNodeInstanceState::Finished);
    assert_eq!(finished.token.value, json!({"customer": "c-1", "approved": true}));

    let again = test
        .runtime
        .flow_nodes()
        .finish_suspended_task(&owner, &task.id, TokenPayload::null())
        .await;
    assert!(matches!(again, Err(CoreError::InvalidState(_))));

    let entries = flatten(
        test.runtime
            .token_history()
            .get_tokens_for_process_instance(&owner, &process.id)
            .await?,
    );
    assert_entry_sequence(
        &entries,
        &task.id,
        &[TokenEventType::OnEnter, TokenEventType::OnExit],
    )?;
    Ok(())
}

#[tokio::test]
async fn test_every_suspendable_type_shares_the_contract() -> Result<()> {
    let routing = StaticRoutingEngine::new().ending_at("End_Signal");
    let test = TestRuntime::builder().with_routing(routing.clone()).build();
    let owner = default_user();
    let process = test.start_process(&owner, "mixed", json!({})).await?;

    let mut instances = Vec::new();
    for (flow_node_id, flow_node_type) in [
        ("Manual_1", FlowNodeType::ManualTask),
        ("Empty_1", FlowNodeType::EmptyActivity),
        ("End_Signal", FlowNodeType::Event),
    ] {
        let instance = test
            .enter_suspended(&process, flow_node_id, flow_node_type, json!({"at": flow_node_id}))
            .await?;
        assert!(instance.is_suspended());
        instances.push(instance);
    }

    for instance in &instances {
        test.runtime
            .flow_nodes()
            .finish_suspended_task(&owner, &instance.id, TokenPayload::null())
            .await?;
    }
    assert_eq!(routing.resumed().len(), 3);

    let process = test
        .runtime
        .process_instances()
        .get_by_id(&owner, &process.id)
        .await?;
    assert_eq!(process.state, ProcessInstanceState::Finished);
    assert_eq!(
        process.end_token,
        Some(TokenPayload::new(json!({"at": "End_Signal"})))
    );
    Ok(())
}

#[tokio::test]
async fn test_external_tasks_are_not_finished_as_suspended_tasks() -> Result<()> {
    let test = TestRuntime::builder().build();
    let seeded = suspend_at_external_task(&test, "shipping", json!(null)).await?;

    let result = test
        .runtime
        .flow_nodes()
        .finish_suspended_task(&default_user(), &seeded.flow_node_instance.id, TokenPayload::null())
        .await;
    assert!(matches!(result, Err(CoreError::BadRequest(_))));
    Ok(())
}

#[tokio::test]
async fn test_foreign_user_cannot_finish_or_read_task() -> Result<()> {
    let test = TestRuntime::builder().build();
    let process = test
        .start_process(&default_user(), "user_task_sample", json!(null))
        .await?;
    let task = test
        .enter_suspended(&process, "UserTask_1", FlowNodeType::UserTask, json!(null))
        .await?;
    let flow_nodes = test.runtime.flow_nodes();

    let finish = flow_nodes
        .finish_suspended_task(&restricted_user(), &task.id, TokenPayload::null())
        .await;
    assert!(matches!(finish, Err(CoreError::Forbidden(_))));

    let get = flow_nodes.get(&Identity::anonymous(), &task.id).await;
    assert!(matches!(get, Err(CoreError::Unauthenticated(_))));

    // super admins see everything
    flow_nodes.get(&super_admin(), &task.id).await?;
    Ok(())
}

#[tokio::test]
async fn test_enter_validates_process_and_topic() -> Result<()> {
    let test = TestRuntime::builder().build();
    let owner = default_user();
    let process = test.start_process(&owner, "model", json!(null)).await?;
    let flow_nodes = test.runtime.flow_nodes();

    let no_topic = flow_nodes
        .enter(EnterFlowNode::new(
            process.id.clone(),
            "ExternalTask_1",
            FlowNodeType::ExternalTask,
            owner.clone(),
            TokenPayload::null(),
        ))
        .await;
    assert!(matches!(no_topic, Err(CoreError::BadRequest(_))));

    let foreign = flow_nodes
        .enter(EnterFlowNode::new(
            process.id.clone(),
            "UserTask_1",
            FlowNodeType::UserTask,
            restricted_user(),
            TokenPayload::null(),
        ))
        .await;
    assert!(matches!(foreign, Err(CoreError::NotFound(_))));

    flow_nodes.terminate(&owner, &process.id).await?;
    let after_end = test
        .enter_suspended(&process, "UserTask_1", FlowNodeType::UserTask, json!(null))
        .await;
    assert!(matches!(
        after_end,
        Err(flowgate_test_utils::TestError::Core(CoreError::InvalidState(_)))
    ));
    Ok(())
}

#[tokio::test]
async fn test_terminate_faults_everything_and_aborts_leases() -> Result<()> {
    let test = TestRuntime::builder().build();
    let owner = default_user();
    let seeded = suspend_at_external_task(&test, "shipping", json!({"orderId": 1})).await?;
    let user_task = test
        .enter_suspended(
            &seeded.process_instance,
            "UserTask_1",
            FlowNodeType::UserTask,
            json!(null),
        )
        .await?;

    let a = worker("worker-a");
    let queue = test.runtime.external_tasks();
    queue
        .fetch_and_lock(&a, &LockRequest::new("worker-a", "shipping", 1, Duration::from_secs(30)))
        .await?;

    let denied = test
        .runtime
        .flow_nodes()
        .terminate(&restricted_user(), &seeded.process_instance.id)
        .await;
    assert!(matches!(denied, Err(CoreError::NotFound(_))));

    let process = test
        .runtime
        .flow_nodes()
        .terminate(&owner, &seeded.process_instance.id)
        .await?;
    assert_eq!(process.state, ProcessInstanceState::Error);

    let task = queue.get(&a, &seeded.task.id).await?;
    assert_eq!(task.state, ExternalTaskState::Finished);
    assert!(matches!(task.error, Some(ExternalTaskError::Aborted { .. })));
    let late_finish = queue
        .finish(&a, "worker-a", &seeded.task.id, TokenPayload::null())
        .await;
    assert!(matches!(late_finish, Err(CoreError::Gone(_))));

    let mut instances = Vec::new();
    for id in [&seeded.flow_node_instance.id, &user_task.id] {
        let instance = test.runtime.flow_nodes().get(&owner, id).await?;
        assert_eq!(instance.state, FlowNodeInstanceState::Error);
        instances.push(instance);
    }
    let entries = flatten(
        test.runtime
            .token_history()
            .get_tokens_for_process_instance(&owner, &seeded.process_instance.id)
            .await?,
    );
    let terminated: Vec<_> = instances.iter().map(|i| i.id.clone()).collect();
    assert_ledger_consistent(&entries, &instances, &terminated)?;

    let active = test
        .runtime
        .token_history()
        .get_active_tokens_for_process_instance(&owner, &seeded.process_instance.id)
        .await?;
    assert!(active.is_empty());

    let again = test
        .runtime
        .flow_nodes()
        .terminate(&owner, &seeded.process_instance.id)
        .await;
    assert!(matches!(again, Err(CoreError::InvalidState(_))));
    Ok(())
}

#[tokio::test]
async fn test_suspended_task_pagination() -> Result<()> {
    let test = TestRuntime::builder().build();
    let owner = default_user();
    let process = test.start_process(&owner, "paged", json!(null)).await?;
    let mut ids = Vec::new();
    for n in 0..5 {
        let task = test
            .enter_suspended(&process, &format!("UserTask_{n}"), FlowNodeType::UserTask, json!(n))
            .await?;
        ids.push(task.id);
        test.clock.advance_secs(1);
    }
    let query = SuspendedTaskQuery::ByProcessInstance(process.id.clone());
    let flow_nodes = test.runtime.flow_nodes();

    for (offset, limit, expected) in [
        (0, None, 0..5),
        (1, Some(2), 1..3),
        (3, Some(10), 3..5),
        (2, None, 2..5),
        (5, Some(1), 5..5),
        (9, None, 5..5),
        (0, Some(0), 0..0),
    ] {
        let page = flow_nodes
            .get_suspended_tasks(&owner, &query, Pagination::new(offset, limit))
            .await?;
        let got: Vec<_> = page.items.into_iter().map(|i| i.id).collect();
        assert_eq!(got, ids[expected].to_vec(), "offset={offset} limit={limit:?}");
        assert_eq!(page.total_count, 5);
    }
    Ok(())
}

#[tokio::test]
async fn test_suspended_task_queries_are_identity_filtered() -> Result<()> {
    let test = TestRuntime::builder().build();
    let owner = default_user();
    let process = test.start_process(&owner, "review", json!(null)).await?;
    test.enter_suspended(&process, "Review", FlowNodeType::UserTask, json!(null))
        .await?;
    let flow_nodes = test.runtime.flow_nodes();

    for query in [
        SuspendedTaskQuery::ByCorrelation(process.correlation_id.clone()),
        SuspendedTaskQuery::ByProcessModel(ProcessModelId::from("review")),
        SuspendedTaskQuery::ByProcessInstance(process.id.clone()),
        SuspendedTaskQuery::ByFlowNode(FlowNodeId::from("Review")),
    ] {
        let mine = flow_nodes
            .get_suspended_tasks(&owner, &query, Pagination::all())
            .await?;
        assert_eq!(mine.total_count, 1, "{query:?}");

        let theirs = flow_nodes
            .get_suspended_tasks(&restricted_user(), &query, Pagination::all())
            .await;
        assert!(matches!(theirs, Err(CoreError::Forbidden(_))), "{query:?}");
    }

    let own = flow_nodes
        .get_suspended_tasks(&restricted_user(), &SuspendedTaskQuery::ByIdentity, Pagination::all())
        .await?;
    assert_eq!(own.total_count, 0);

    let unknown = flow_nodes
        .get_suspended_tasks(
            &owner,
            &SuspendedTaskQuery::ByCorrelation(CorrelationId::from("missing")),
            Pagination::all(),
        )
        .await?;
    assert!(unknown.items.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_process_instance_lookups_mask_foreign_owners() -> Result<()> {
    let test = TestRuntime::builder().build();
    let owner = default_user();
    let process = test.start_process(&owner, "order", json!({"n": 1})).await?;
    let processes = test.runtime.process_instances();

    let by_id = processes.get_by_id(&restricted_user(), &process.id).await;
    assert!(matches!(by_id, Err(CoreError::NotFound(_))));

    let by_correlation = processes
        .get_by_correlation(&restricted_user(), &process.correlation_id)
        .await;
    assert!(matches!(by_correlation, Err(CoreError::NotFound(_))));

    let found = processes
        .get_by_correlation(&owner, &process.correlation_id)
        .await?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].start_token, TokenPayload::new(json!({"n": 1})));

    let page = processes
        .get_by_process_model(&super_admin(), &ProcessModelId::from("order"), Pagination::all())
        .await?;
    assert_eq!(page.total_count, 1);
    Ok(())
}
