//! Log-based metrics for the external task queue.

use std::fmt;
use tracing::info;

/// Result of a queue operation as reported in metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOutcome {
    Success,
    /// The caller's request was refused
    Rejected,
    /// The runtime or its store could not complete the request
    Failed,
}

impl QueueOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueOutcome::Success => "success",
            QueueOutcome::Rejected => "rejected",
            QueueOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for QueueOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External task queue metrics
pub struct QueueMetrics;

impl QueueMetrics {
    /// Record a fetch-and-lock poll
    pub fn record_fetch_and_lock(
        topic: &str,
        worker_id: &str,
        requested: usize,
        locked: usize,
        outcome: QueueOutcome,
    ) {
        info!(
            metric = "external_task.fetch_and_lock",
            topic,
            worker_id,
            requested,
            locked,
            outcome = %outcome,
            "Queue metric"
        );
    }

    /// Record a lock extension
    pub fn record_extend_lock(worker_id: &str, outcome: QueueOutcome) {
        info!(
            metric = "external_task.extend_lock",
            worker_id,
            outcome = %outcome,
            "Queue metric"
        );
    }

    /// Record a completion; `kind` is "result", "bpmn_error" or "service_error"
    pub fn record_completion(worker_id: &str, kind: &str, outcome: QueueOutcome) {
        info!(
            metric = "external_task.complete",
            worker_id,
            kind,
            outcome = %outcome,
            "Queue metric"
        );
    }

    /// Record an expired-lock reclamation sweep
    pub fn record_reclaimed(count: usize) {
        info!(metric = "external_task.reclaimed", count, "Queue metric");
    }
}
