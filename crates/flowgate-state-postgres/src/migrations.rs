/// Generate SQL migrations for the PostgreSQL state store
///
/// Entities are stored whole in a `data` JSONB column; the key columns
/// beside it exist for filtering, ordering and compare-and-set updates.
pub fn generate_migrations() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "20240401000000_initial_schema",
            r#"
            CREATE TABLE IF NOT EXISTS process_instances (
                id TEXT PRIMARY KEY,
                process_model_id TEXT NOT NULL,
                correlation_id TEXT NOT NULL,
                state TEXT NOT NULL,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_process_instances_correlation ON process_instances(correlation_id);
            CREATE INDEX IF NOT EXISTS idx_process_instances_model ON process_instances(process_model_id);

            CREATE TABLE IF NOT EXISTS flow_node_instances (
                id TEXT PRIMARY KEY,
                flow_node_id TEXT NOT NULL,
                flow_node_type TEXT NOT NULL,
                process_instance_id TEXT NOT NULL REFERENCES process_instances(id),
                process_model_id TEXT NOT NULL,
                correlation_id TEXT NOT NULL,
                owner_user_id TEXT NOT NULL,
                state TEXT NOT NULL,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_flow_node_instances_state ON flow_node_instances(state, process_instance_id);
            CREATE INDEX IF NOT EXISTS idx_flow_node_instances_flow_node ON flow_node_instances(flow_node_id);

            CREATE TABLE IF NOT EXISTS external_tasks (
                id TEXT PRIMARY KEY,
                flow_node_instance_id TEXT NOT NULL UNIQUE REFERENCES flow_node_instances(id),
                process_instance_id TEXT NOT NULL,
                topic TEXT NOT NULL,
                state TEXT NOT NULL,
                worker_id TEXT,
                lock_expiration_time TIMESTAMPTZ,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_external_tasks_pending ON external_tasks(topic, created_at, id) WHERE state = 'pending';
            CREATE INDEX IF NOT EXISTS idx_external_tasks_locked ON external_tasks(lock_expiration_time) WHERE state = 'locked';

            CREATE TABLE IF NOT EXISTS token_history (
                seq BIGSERIAL PRIMARY KEY,
                flow_node_instance_id TEXT NOT NULL,
                flow_node_id TEXT NOT NULL,
                token_event_type TEXT NOT NULL,
                process_instance_id TEXT NOT NULL,
                process_model_id TEXT NOT NULL,
                correlation_id TEXT NOT NULL,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_token_history_process_instance ON token_history(process_instance_id, created_at, seq);
            CREATE INDEX IF NOT EXISTS idx_token_history_correlation ON token_history(correlation_id, process_model_id, created_at, seq);
            "#,
        ),
    ]
}
