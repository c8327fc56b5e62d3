use flowgate_monitoring::{LogExt, MonitoringConfig, QueueMetrics, QueueOutcome};
use std::io;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

// Collects formatted log lines in memory
#[derive(Clone, Default)]
struct CapturedLogs {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn capture<F: FnOnce()>(f: F) -> String {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    logs.contents()
}

#[test]
fn test_queue_metrics_are_structured_events() {
    let output = capture(|| {
        QueueMetrics::record_fetch_and_lock("invoice", "worker-a", 5, 2, QueueOutcome::Success);
        QueueMetrics::record_extend_lock("worker-a", QueueOutcome::Rejected);
        QueueMetrics::record_completion("worker-a", "result", QueueOutcome::Failed);
        QueueMetrics::record_reclaimed(3);
    });

    assert!(output.contains("external_task.fetch_and_lock"));
    assert!(output.contains("requested=5"));
    assert!(output.contains("locked=2"));
    assert!(output.contains("external_task.extend_lock"));
    assert!(output.contains("outcome=success"));
    assert!(output.contains("outcome=rejected"));
    assert!(output.contains("outcome=failed"));
    assert!(output.contains("count=3"));
}

#[test]
fn test_log_ext_logs_only_matching_branch() {
    let output = capture(|| {
        let failed: Result<(), String> = Err("lease expired".to_string());
        let _ = failed.log_err("Finishing task failed").log_ok("never logged");

        let ok: Result<u8, String> = Ok(1);
        let _ = ok.log_err("never logged either").log_ok("Task finished");
    });

    assert!(output.contains("Finishing task failed: lease expired"));
    assert!(output.contains("Task finished"));
    assert!(!output.contains("never logged"));
}

#[test]
fn test_env_filter_falls_back_to_config() {
    // RUST_LOG is not set by the test harness
    if std::env::var("RUST_LOG").is_ok() {
        return;
    }
    let config = MonitoringConfig::default().with_log_filter("warn");
    let filter = flowgate_monitoring::logging::env_filter(&config);
    assert_eq!(filter.to_string(), "warn");
}
