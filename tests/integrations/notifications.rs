//! Lifecycle notifications seen through the channel publisher

use anyhow::Result;
use flowgate_core::domain::events::{ExternalTaskLocked, ProcessInstanceTerminated};
use flowgate_core::{LockRequest, SharedEvent, Subscription, TokenPayload};
use flowgate_integration_tests::utils::suspend_at_external_task;
use flowgate_test_utils::fixtures::{default_user, worker};
use flowgate_test_utils::TestRuntime;
use serde_json::json;
use std::time::Duration;

fn drain(subscription: &mut Subscription) -> Vec<SharedEvent> {
    let mut events = Vec::new();
    while let Some(event) = subscription.try_recv() {
        events.push(event);
    }
    events
}

fn types(events: &[SharedEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.event_type()).collect()
}

#[tokio::test]
async fn test_lease_lifecycle_publishes_in_order() -> Result<()> {
    let test = TestRuntime::builder().build();
    let mut all = test.publisher.subscribe(None);

    let seeded = suspend_at_external_task(&test, "mail", json!(null)).await?;
    let a = worker("worker-a");
    let queue = test.runtime.external_tasks();
    queue
        .fetch_and_lock(&a, &LockRequest::new("worker-a", "mail", 1, Duration::from_secs(10)))
        .await?;
    queue
        .finish(&a, "worker-a", &seeded.task.id, TokenPayload::new(json!({"sent": true})))
        .await?;

    let events = drain(&mut all);
    assert_eq!(
        types(&events),
        vec![
            "process_instance.started",
            "flow_node.suspended",
            "external_task.locked",
            "external_task.finished",
            "flow_node.finished",
        ]
    );

    let locked = events[2]
        .as_any()
        .downcast_ref::<ExternalTaskLocked>()
        .expect("locked event");
    assert_eq!(locked.worker_id, "worker-a");
    assert_eq!(locked.external_task_id, seeded.task.id);
    assert_eq!(events[2].to_json()["topic"], "mail");
    Ok(())
}

#[tokio::test]
async fn test_service_error_notifies_once_subscriber_once() -> Result<()> {
    let test = TestRuntime::builder().build();
    let mut failures = test.publisher.subscribe_once(Some("process_instance.failed"));

    let first = suspend_at_external_task(&test, "mail", json!(null)).await?;
    let second = suspend_at_external_task(&test, "mail", json!(null)).await?;
    let a = worker("worker-a");
    let queue = test.runtime.external_tasks();
    queue
        .fetch_and_lock(&a, &LockRequest::new("worker-a", "mail", 2, Duration::from_secs(10)))
        .await?;
    for seeded in [&first, &second] {
        queue
            .handle_service_error(&a, "worker-a", &seeded.task.id, "smtp down", json!(null))
            .await?;
    }

    let event = failures.recv().await.expect("one failure");
    assert_eq!(event.process_instance_id(), &first.process_instance.id);
    assert!(failures.recv().await.is_none());
    assert_eq!(test.publisher.subscriber_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_terminate_publishes_failures_then_termination() -> Result<()> {
    let test = TestRuntime::builder().build();
    let owner = default_user();
    let seeded = suspend_at_external_task(&test, "mail", json!(null)).await?;
    let mut subscription = test.publisher.subscribe(None);

    test.runtime
        .flow_nodes()
        .terminate(&owner, &seeded.process_instance.id)
        .await?;

    let events = drain(&mut subscription);
    assert_eq!(
        types(&events),
        vec!["flow_node.failed", "process_instance.terminated"]
    );
    let terminated = events[1]
        .as_any()
        .downcast_ref::<ProcessInstanceTerminated>()
        .expect("terminated event");
    assert_eq!(terminated.terminated_by, owner);

    assert!(test.publisher.unsubscribe(subscription.handle()));
    Ok(())
}
