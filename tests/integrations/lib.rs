// Flowgate Integration Tests
//
// This crate contains cross-crate scenario tests for the Flowgate runtime

/// Shared setup for scenario tests
pub mod utils {
    use flowgate_core::{ExternalTask, FlowNodeInstance, ProcessInstance};
    use flowgate_test_utils::{TestError, TestRuntime};
    use serde_json::Value;

    /// A process instance suspended at one external task
    pub struct SuspendedExternalTask {
        pub process_instance: ProcessInstance,
        pub flow_node_instance: FlowNodeInstance,
        pub task: ExternalTask,
    }

    /// Start a process owned by `default_user` and suspend it at an external task on `topic`
    pub async fn suspend_at_external_task(
        test: &TestRuntime,
        topic: &str,
        payload: Value,
    ) -> Result<SuspendedExternalTask, TestError> {
        let owner = flowgate_test_utils::fixtures::default_user();
        let process_instance = test
            .start_process(&owner, "external_task_sample", payload.clone())
            .await?;
        let flow_node_instance = test
            .enter_external_task(&process_instance, "ExternalTask_1", topic, payload)
            .await?;
        let task = test
            .repositories
            .external_tasks
            .find_by_flow_node_instance(&flow_node_instance.id)
            .await?
            .ok_or_else(|| TestError::TestSetupFailed("external task was not created".to_string()))?;

        Ok(SuspendedExternalTask {
            process_instance,
            flow_node_instance,
            task,
        })
    }
}
