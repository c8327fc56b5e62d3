//! Lease queue scenarios over the in-memory store

use anyhow::Result;
use chrono::Duration as ChronoDuration;
use flowgate_core::{
    Clock, CoreError, ExternalTaskError, ExternalTaskId, ExternalTaskState, FlowNodeInstanceState,
    FlowNodeType, Identity, LockRequest, ProcessInstanceState, TokenEventType, TokenPayload,
    MAX_LOCK_DURATION,
};
use flowgate_integration_tests::utils::suspend_at_external_task;
use flowgate_test_utils::assertions::{assert_entry_sequence, flatten};
use flowgate_test_utils::fixtures::{default_user, restricted_user, super_admin, worker};
use flowgate_test_utils::{StaticRoutingEngine, TestRuntime};
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;

const TOPIC: &str = "payments";

fn lock_request(worker_id: &str, max_tasks: usize, lease_secs: u64) -> LockRequest {
    LockRequest::new(worker_id, TOPIC, max_tasks, Duration::from_secs(lease_secs))
}

#[tokio::test]
async fn test_second_worker_gets_nothing_and_repeat_finish_is_gone() -> Result<()> {
    let test = TestRuntime::builder().build();
    let seeded = suspend_at_external_task(&test, TOPIC, json!({"orderId": 7})).await?;
    let queue = test.runtime.external_tasks();
    let a = worker("worker-a");
    let b = worker("worker-b");

    let locked = queue.fetch_and_lock(&a, &lock_request("worker-a", 1, 10)).await?;
    assert_eq!(locked.len(), 1);
    assert_eq!(locked[0].id, seeded.task.id);
    assert_eq!(locked[0].state, ExternalTaskState::Locked);
    assert_eq!(locked[0].worker_id.as_deref(), Some("worker-a"));
    assert_eq!(
        locked[0].lock_expiration_time,
        Some(test.clock.now() + ChronoDuration::seconds(10))
    );

    let second = queue.fetch_and_lock(&b, &lock_request("worker-b", 1, 10)).await?;
    assert!(second.is_empty());

    queue
        .finish(&a, "worker-a", &seeded.task.id, TokenPayload::new(json!({"result": "ok"})))
        .await?;
    let stored = queue.get(&a, &seeded.task.id).await?;
    assert_eq!(stored.state, ExternalTaskState::Finished);
    assert_eq!(stored.result, Some(TokenPayload::new(json!({"result": "ok"}))));
    assert!(stored.finished_at.is_some());

    let repeat = queue
        .finish(&a, "worker-a", &seeded.task.id, TokenPayload::new(json!({"result": "ok"})))
        .await;
    assert!(matches!(repeat, Err(CoreError::Gone(_))));
    Ok(())
}

#[tokio::test]
async fn test_finish_merges_result_and_writes_exit_token() -> Result<()> {
    let test = TestRuntime::builder().build();
    let seeded = suspend_at_external_task(&test, TOPIC, json!({"orderId": 7})).await?;
    let a = worker("worker-a");
    test.runtime
        .external_tasks()
        .fetch_and_lock(&a, &lock_request("worker-a", 1, 10))
        .await?;

    test.runtime
        .external_tasks()
        .finish(&a, "worker-a", &seeded.task.id, TokenPayload::new(json!({"paid": true})))
        .await?;

    let owner = default_user();
    let instance = test
        .runtime
        .flow_nodes()
        .get(&owner, &seeded.flow_node_instance.id)
        .await?;
    assert_eq!(instance.state, FlowNodeInstanceState::Finished);
    assert_eq!(instance.token.value, json!({"orderId": 7, "paid": true}));

    let entries = flatten(
        test.runtime
            .token_history()
            .get_tokens_for_process_instance(&owner, &seeded.process_instance.id)
            .await?,
    );
    assert_entry_sequence(
        &entries,
        &instance.id,
        &[TokenEventType::OnEnter, TokenEventType::OnExit],
    )?;

    // the default routing engine never ends the process
    let process = test
        .runtime
        .process_instances()
        .get_by_id(&owner, &seeded.process_instance.id)
        .await?;
    assert_eq!(process.state, ProcessInstanceState::Running);
    Ok(())
}

#[tokio::test]
async fn test_extend_lock_is_relative_to_call_time() -> Result<()> {
    let test = TestRuntime::builder().build();
    let seeded = suspend_at_external_task(&test, TOPIC, json!(null)).await?;
    let queue = test.runtime.external_tasks();
    let a = worker("worker-a");
    queue.fetch_and_lock(&a, &lock_request("worker-a", 1, 10)).await?;

    test.clock.advance_secs(5);
    let extended = queue
        .extend_lock(&a, "worker-a", &seeded.task.id, Duration::from_secs(30))
        .await?;
    assert_eq!(
        extended.lock_expiration_time,
        Some(test.clock.now() + ChronoDuration::seconds(30))
    );

    test.clock.advance_secs(1);
    let extended = queue
        .extend_lock(&a, "worker-a", &seeded.task.id, Duration::from_secs(30))
        .await?;
    assert_eq!(
        extended.lock_expiration_time,
        Some(test.clock.now() + ChronoDuration::seconds(30))
    );
    Ok(())
}

#[tokio::test]
async fn test_non_owner_extend_is_locked_even_after_lease_ran_out() -> Result<()> {
    let test = TestRuntime::builder().build();
    let seeded = suspend_at_external_task(&test, TOPIC, json!(null)).await?;
    let queue = test.runtime.external_tasks();
    let a = worker("worker-a");
    let b = worker("worker-b");
    queue.fetch_and_lock(&a, &lock_request("worker-a", 1, 10)).await?;

    let early = queue
        .extend_lock(&b, "worker-b", &seeded.task.id, Duration::from_secs(10))
        .await;
    assert!(matches!(early, Err(CoreError::Locked(_))));

    test.clock.advance_secs(60);
    let late = queue
        .extend_lock(&b, "worker-b", &seeded.task.id, Duration::from_secs(10))
        .await;
    assert!(matches!(late, Err(CoreError::Locked(_))));

    let finish = queue
        .finish(&b, "worker-b", &seeded.task.id, TokenPayload::null())
        .await;
    assert!(matches!(finish, Err(CoreError::Locked(_))));
    Ok(())
}

#[tokio::test]
async fn test_every_completion_on_finished_task_is_gone() -> Result<()> {
    let test = TestRuntime::builder().build();
    let seeded = suspend_at_external_task(&test, TOPIC, json!(null)).await?;
    let queue = test.runtime.external_tasks();
    let a = worker("worker-a");
    queue.fetch_and_lock(&a, &lock_request("worker-a", 1, 10)).await?;
    queue
        .handle_service_error(&a, "worker-a", &seeded.task.id, "timeout", json!({"attempt": 1}))
        .await?;

    let id = &seeded.task.id;
    let finish = queue.finish(&a, "worker-a", id, TokenPayload::null()).await;
    let bpmn = queue
        .handle_bpmn_error(&a, "worker-a", id, "PaymentDeclined", "declined")
        .await;
    let service = queue
        .handle_service_error(&a, "worker-a", id, "again", json!(null))
        .await;
    let extend = queue
        .extend_lock(&a, "worker-a", id, Duration::from_secs(5))
        .await;

    assert!(matches!(finish, Err(CoreError::Gone(_))));
    assert!(matches!(bpmn, Err(CoreError::Gone(_))));
    assert!(matches!(service, Err(CoreError::Gone(_))));
    assert!(matches!(extend, Err(CoreError::Gone(_))));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_fetch_and_lock_never_hands_out_a_task_twice() -> Result<()> {
    let test = TestRuntime::builder().build();
    for _ in 0..20 {
        suspend_at_external_task(&test, TOPIC, json!(null)).await?;
    }

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let runtime = test.runtime.clone();
            tokio::spawn(async move {
                let worker_id = format!("worker-{n}");
                let identity = worker(&worker_id);
                runtime
                    .external_tasks()
                    .fetch_and_lock(&identity, &lock_request(&worker_id, 5, 30))
                    .await
                    .map(|tasks| (worker_id, tasks))
            })
        })
        .collect();

    let mut seen: HashSet<ExternalTaskId> = HashSet::new();
    let mut total = 0;
    for result in futures::future::join_all(handles).await {
        let (worker_id, tasks) = result??;
        for task in tasks {
            assert_eq!(task.worker_id.as_deref(), Some(worker_id.as_str()));
            assert!(seen.insert(task.id), "task handed out twice");
            total += 1;
        }
    }
    assert_eq!(total, 20);
    Ok(())
}

#[tokio::test]
async fn test_offset_and_max_tasks_window_over_oldest_first() -> Result<()> {
    let test = TestRuntime::builder().build();
    let mut created = Vec::new();
    for _ in 0..3 {
        created.push(suspend_at_external_task(&test, TOPIC, json!(null)).await?.task.id);
        test.clock.advance_secs(1);
    }
    let a = worker("worker-a");
    let queue = test.runtime.external_tasks();

    let none = queue.fetch_and_lock(&a, &lock_request("worker-a", 0, 10)).await?;
    assert!(none.is_empty());

    let second = queue
        .fetch_and_lock(&a, &lock_request("worker-a", 1, 10).with_offset(1))
        .await?;
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].id, created[1]);

    let rest = queue.fetch_and_lock(&a, &lock_request("worker-a", 10, 10)).await?;
    let ids: Vec<_> = rest.into_iter().map(|task| task.id).collect();
    assert_eq!(ids, vec![created[0].clone(), created[2].clone()]);
    Ok(())
}

#[tokio::test]
async fn test_queue_requires_authentication_and_claim() -> Result<()> {
    let test = TestRuntime::builder().build();
    suspend_at_external_task(&test, TOPIC, json!(null)).await?;
    let queue = test.runtime.external_tasks();

    let anonymous = queue
        .fetch_and_lock(&Identity::anonymous(), &lock_request("worker-a", 1, 10))
        .await;
    assert!(matches!(anonymous, Err(CoreError::Unauthenticated(_))));

    let restricted = queue
        .fetch_and_lock(&restricted_user(), &lock_request("worker-a", 1, 10))
        .await;
    assert!(matches!(restricted, Err(CoreError::Forbidden(_))));

    let blank = queue
        .fetch_and_lock(&worker("worker-a"), &lock_request("  ", 1, 10))
        .await;
    assert!(matches!(blank, Err(CoreError::BadRequest(_))));

    let unknown = queue
        .get(&worker("worker-a"), &ExternalTaskId::from("missing"))
        .await;
    assert!(matches!(unknown, Err(CoreError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_uncaught_bpmn_error_faults_process() -> Result<()> {
    let routing = StaticRoutingEngine::new().catching("OutOfStock");
    let test = TestRuntime::builder().with_routing(routing.clone()).build();
    let seeded = suspend_at_external_task(&test, TOPIC, json!(null)).await?;
    let a = worker("worker-a");
    let queue = test.runtime.external_tasks();
    queue.fetch_and_lock(&a, &lock_request("worker-a", 1, 10)).await?;

    let task = queue
        .handle_bpmn_error(&a, "worker-a", &seeded.task.id, "PaymentDeclined", "card declined")
        .await?;
    assert_eq!(task.state, ExternalTaskState::Finished);
    assert_eq!(
        task.error,
        Some(ExternalTaskError::Bpmn {
            code: "PaymentDeclined".to_string(),
            message: "card declined".to_string(),
        })
    );
    assert_eq!(routing.routed_errors(), vec!["PaymentDeclined".to_string()]);

    let owner = default_user();
    let process = test
        .runtime
        .process_instances()
        .get_by_id(&owner, &seeded.process_instance.id)
        .await?;
    assert_eq!(process.state, ProcessInstanceState::Error);

    let instance = test
        .runtime
        .flow_nodes()
        .get(&owner, &seeded.flow_node_instance.id)
        .await?;
    assert_eq!(instance.state, FlowNodeInstanceState::Error);
    Ok(())
}

#[tokio::test]
async fn test_caught_bpmn_error_keeps_process_running() -> Result<()> {
    let routing = StaticRoutingEngine::new().catching("OutOfStock");
    let test = TestRuntime::builder().with_routing(routing).build();
    let seeded = suspend_at_external_task(&test, TOPIC, json!(null)).await?;
    let a = worker("worker-a");
    let queue = test.runtime.external_tasks();
    queue.fetch_and_lock(&a, &lock_request("worker-a", 1, 10)).await?;

    queue
        .handle_bpmn_error(&a, "worker-a", &seeded.task.id, "OutOfStock", "no stock")
        .await?;

    let owner = default_user();
    let process = test
        .runtime
        .process_instances()
        .get_by_id(&owner, &seeded.process_instance.id)
        .await?;
    assert_eq!(process.state, ProcessInstanceState::Running);

    let entries = flatten(
        test.runtime
            .token_history()
            .get_tokens_for_process_instance(&owner, &seeded.process_instance.id)
            .await?,
    );
    assert_entry_sequence(
        &entries,
        &seeded.flow_node_instance.id,
        &[TokenEventType::OnEnter, TokenEventType::OnExit],
    )?;
    Ok(())
}

#[tokio::test]
async fn test_blank_bpmn_error_code_is_bad_request() -> Result<()> {
    let test = TestRuntime::builder().build();
    let seeded = suspend_at_external_task(&test, TOPIC, json!(null)).await?;
    let a = worker("worker-a");
    let queue = test.runtime.external_tasks();
    queue.fetch_and_lock(&a, &lock_request("worker-a", 1, 10)).await?;

    let result = queue
        .handle_bpmn_error(&a, "worker-a", &seeded.task.id, " ", "no code")
        .await;
    assert!(matches!(result, Err(CoreError::BadRequest(_))));

    let stored = queue.get(&a, &seeded.task.id).await?;
    assert_eq!(stored.state, ExternalTaskState::Locked);
    Ok(())
}

#[tokio::test]
async fn test_service_error_always_faults_process() -> Result<()> {
    let routing = StaticRoutingEngine::new().catching("ServiceError");
    let test = TestRuntime::builder().with_routing(routing.clone()).build();
    let seeded = suspend_at_external_task(&test, TOPIC, json!(null)).await?;
    let a = worker("worker-a");
    let queue = test.runtime.external_tasks();
    queue.fetch_and_lock(&a, &lock_request("worker-a", 1, 10)).await?;

    let task = queue
        .handle_service_error(&a, "worker-a", &seeded.task.id, "connection reset", json!({"retries": 3}))
        .await?;
    assert_eq!(
        task.error,
        Some(ExternalTaskError::Service {
            message: "connection reset".to_string(),
            details: json!({"retries": 3}),
        })
    );
    assert!(routing.routed_errors().is_empty());

    let process = test
        .runtime
        .process_instances()
        .get_by_id(&default_user(), &seeded.process_instance.id)
        .await?;
    assert_eq!(process.state, ProcessInstanceState::Error);
    Ok(())
}

#[tokio::test]
async fn test_reclaim_returns_expired_leases_to_the_pool() -> Result<()> {
    let test = TestRuntime::builder().build();
    let seeded = suspend_at_external_task(&test, TOPIC, json!(null)).await?;
    let queue = test.runtime.external_tasks();
    let a = worker("worker-a");
    let b = worker("worker-b");
    queue.fetch_and_lock(&a, &lock_request("worker-a", 1, 10)).await?;

    test.clock.advance_secs(5);
    assert!(queue.reclaim_expired_locks(&super_admin()).await?.is_empty());

    let denied = queue.reclaim_expired_locks(&default_user()).await;
    assert!(matches!(denied, Err(CoreError::Forbidden(_))));

    test.clock.advance_secs(6);
    let reclaimed = queue.reclaim_expired_locks(&super_admin()).await?;
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].state, ExternalTaskState::Pending);
    assert_eq!(reclaimed[0].worker_id, None);
    assert_eq!(reclaimed[0].lock_expiration_time, None);

    let relocked = queue.fetch_and_lock(&b, &lock_request("worker-b", 1, 10)).await?;
    assert_eq!(relocked.len(), 1);
    assert_eq!(relocked[0].id, seeded.task.id);

    let stale = queue
        .finish(&a, "worker-a", &seeded.task.id, TokenPayload::null())
        .await;
    assert!(matches!(stale, Err(CoreError::Locked(_))));
    Ok(())
}

#[tokio::test]
async fn test_rejected_fetch_leaves_queue_unchanged() -> Result<()> {
    let test = TestRuntime::builder().build();
    let seeded = suspend_at_external_task(&test, TOPIC, json!(null)).await?;
    let queue = test.runtime.external_tasks();
    let a = worker("worker-a");
    let b = worker("worker-b");

    let oversized = LockRequest::new("worker-a", TOPIC, 1, Duration::from_millis(u64::MAX));
    let rejected = queue.fetch_and_lock(&a, &oversized).await;
    assert!(matches!(rejected, Err(CoreError::BadRequest(_))));

    let stored = queue.get(&a, &seeded.task.id).await?;
    assert_eq!(stored.state, ExternalTaskState::Pending);
    assert_eq!(stored.worker_id, None);
    assert_eq!(stored.lock_expiration_time, None);

    let locked = queue.fetch_and_lock(&b, &lock_request("worker-b", 1, 10)).await?;
    assert_eq!(locked.len(), 1);
    assert_eq!(locked[0].id, seeded.task.id);

    let too_long = queue
        .extend_lock(&b, "worker-b", &seeded.task.id, MAX_LOCK_DURATION + Duration::from_secs(1))
        .await;
    assert!(matches!(too_long, Err(CoreError::BadRequest(_))));
    let stored = queue.get(&b, &seeded.task.id).await?;
    assert_eq!(
        stored.lock_expiration_time,
        Some(test.clock.now() + ChronoDuration::seconds(10))
    );
    Ok(())
}

#[tokio::test]
async fn test_process_fault_closes_sibling_work() -> Result<()> {
    let routing = StaticRoutingEngine::new();
    let test = TestRuntime::builder().with_routing(routing.clone()).build();
    let owner = default_user();
    let seeded = suspend_at_external_task(&test, TOPIC, json!(null)).await?;
    let process = &seeded.process_instance;
    test.clock.advance_secs(1);
    let sibling = test
        .enter_external_task(process, "ExternalTask_2", TOPIC, json!(null))
        .await?;
    let review = test
        .enter_suspended(process, "Review", FlowNodeType::UserTask, json!(null))
        .await?;

    let queue = test.runtime.external_tasks();
    let a = worker("worker-a");
    let b = worker("worker-b");
    let locked = queue.fetch_and_lock(&a, &lock_request("worker-a", 1, 10)).await?;
    assert_eq!(locked[0].id, seeded.task.id);

    queue
        .handle_service_error(&a, "worker-a", &seeded.task.id, "timeout", json!(null))
        .await?;

    let faulted = test
        .runtime
        .process_instances()
        .get_by_id(&owner, &process.id)
        .await?;
    assert_eq!(faulted.state, ProcessInstanceState::Error);

    let after_fault = queue.fetch_and_lock(&b, &lock_request("worker-b", 5, 10)).await?;
    assert!(after_fault.is_empty());

    let sibling_task = test
        .repositories
        .external_tasks
        .find_by_flow_node_instance(&sibling.id)
        .await?
        .expect("sibling task");
    assert_eq!(sibling_task.state, ExternalTaskState::Finished);
    assert_eq!(sibling_task.error.as_ref().map(|e| e.code()), Some("Aborted"));
    let late = queue
        .finish(&b, "worker-b", &sibling_task.id, TokenPayload::null())
        .await;
    assert!(matches!(late, Err(CoreError::Gone(_))));

    let flow_nodes = test.runtime.flow_nodes();
    for id in [&sibling.id, &review.id] {
        assert_eq!(flow_nodes.get(&owner, id).await?.state, FlowNodeInstanceState::Error);
    }
    let late_review = flow_nodes
        .finish_suspended_task(&owner, &review.id, TokenPayload::null())
        .await;
    assert!(matches!(late_review, Err(CoreError::InvalidState(_))));

    let active = test
        .runtime
        .token_history()
        .get_active_tokens_for_process_instance(&owner, &process.id)
        .await?;
    assert!(active.is_empty());

    let entries = flatten(
        test.runtime
            .token_history()
            .get_tokens_for_process_instance(&owner, &process.id)
            .await?,
    );
    assert_entry_sequence(
        &entries,
        &seeded.flow_node_instance.id,
        &[TokenEventType::OnEnter, TokenEventType::OnExit],
    )?;
    assert_entry_sequence(&entries, &sibling.id, &[TokenEventType::OnEnter])?;
    assert_entry_sequence(&entries, &review.id, &[TokenEventType::OnEnter])?;
    assert!(routing.resumed().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_terminate_leaves_worker_completed_task_to_its_exit() -> Result<()> {
    let routing = StaticRoutingEngine::new();
    let test = TestRuntime::builder().with_routing(routing.clone()).build();
    let owner = default_user();
    let seeded = suspend_at_external_task(&test, TOPIC, json!({"n": 1})).await?;
    let queue = test.runtime.external_tasks();
    let a = worker("worker-a");
    let mut task = queue
        .fetch_and_lock(&a, &lock_request("worker-a", 1, 10))
        .await?
        .remove(0);

    // the worker committed its result but has not moved the flow node yet
    task.finish("worker-a", TokenPayload::new(json!({"n": 2})), test.clock.now())?;
    assert!(
        test.repositories
            .external_tasks
            .save_if_unchanged(&task, ExternalTaskState::Locked, Some("worker-a"))
            .await?
    );

    test.runtime
        .flow_nodes()
        .terminate(&owner, &seeded.process_instance.id)
        .await?;
    let stored = queue.get(&a, &task.id).await?;
    assert_eq!(stored.result, Some(TokenPayload::new(json!({"n": 2}))));
    assert_eq!(stored.error, None);

    let instance = test
        .runtime
        .flow_nodes()
        .exit(&seeded.flow_node_instance.id, TokenPayload::new(json!({"n": 2})))
        .await?;
    assert_eq!(instance.state, FlowNodeInstanceState::Finished);
    assert!(routing.resumed().is_empty());

    let entries = flatten(
        test.runtime
            .token_history()
            .get_tokens_for_process_instance(&owner, &seeded.process_instance.id)
            .await?,
    );
    assert_entry_sequence(
        &entries,
        &instance.id,
        &[TokenEventType::OnEnter, TokenEventType::OnExit],
    )?;
    Ok(())
}
