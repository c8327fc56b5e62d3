/// Ownership and claim checks
pub mod authorization;

/// Lifecycle notification channel
pub mod notification;

/// Routing engine port
pub mod routing;

/// Token history ledger
pub mod token_history;

/// Flow node instance lifecycle manager
pub mod flow_node_instance_service;

/// External task lease queue
pub mod external_task_service;

/// Process instance service
pub mod process_instance_service;

/// Runtime wiring
pub mod runtime_interface;
