/// Identifier value objects
pub mod ids;

/// Caller identity
pub mod identity;

/// Process instance aggregate
pub mod process_instance;

/// Flow node instance aggregate
pub mod flow_node_instance;

/// External task aggregate and lease state machine
pub mod external_task;

/// Token history entries and queries
pub mod token_history;

/// Domain events
pub mod events;

/// Repository interfaces
pub mod repository;
