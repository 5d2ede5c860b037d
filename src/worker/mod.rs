//! The worker loop: lease requests, drive distribution, retire.
//!
//! A worker is single-threaded and sequential with respect to requests:
//! one claimed request is distributed to completion (or abandonment)
//! before the next pop. Parallelism is fleet-level; the coordinator's
//! atomic pop-min is the only synchronization primitive. The worker
//! retires once either lifetime budget is exhausted and is restarted by a
//! supervisor, which is also how config changes are picked up.

mod retry;

pub use retry::{retry_async, RetryConfig};

use crate::coordinator::{ArcCoordinator, Coordinator, Task};
use crate::core::config::{BackendConfig, Limits};
use crate::core::error::{ConfigError, WorkerError};
use crate::core::event::FIN;
use crate::distribute::Distributor;
use crate::tasting::Tasting;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Sleep between polls when the task queue is empty.
const IDLE_BACKOFF: Duration = Duration::from_millis(250);

/// Computes the request budget from its absolute expiry, rounded up to
/// whole seconds. `None` means the task is already expired.
fn request_budget(expire_at: i64, now_ms: i64) -> Option<Duration> {
    let remaining_ms = expire_at.saturating_mul(1000).saturating_sub(now_ms);
    if remaining_ms <= 0 {
        return None;
    }
    let secs = (remaining_ms + 999) / 1000;
    Some(Duration::from_secs(secs as u64))
}

/// One bounded-lifetime worker.
#[derive(Debug)]
pub struct Worker {
    coordinator: ArcCoordinator,
    distributor: Distributor,
    limits: Limits,
}

impl Worker {
    /// Builds a worker from a loaded config: tasting sources and scanner
    /// mappings are compiled here, so a bad config fails before the first
    /// pop.
    pub fn from_config(
        config: BackendConfig,
        coordinator: ArcCoordinator,
    ) -> Result<Self, ConfigError> {
        let config = Arc::new(config);
        let tasting = Tasting::from_config(&config.tasting)?;
        let distributor =
            Distributor::new(Arc::clone(&config), Arc::clone(&coordinator), tasting)?;

        Ok(Self {
            coordinator,
            distributor,
            limits: config.limits,
        })
    }

    /// Runs the lease loop until a lifetime budget is exhausted. Returns
    /// the number of requests handled (counted per request, not per file
    /// node; expired tasks are skipped without counting).
    pub async fn run(&mut self) -> u64 {
        let retire_at = Instant::now() + self.limits.time_to_live();
        let mut handled = 0u64;

        while handled < self.limits.max_files && Instant::now() < retire_at {
            let task = match self.coordinator.pop_task().await {
                Ok(Some(task)) => task,
                Ok(None) => {
                    tokio::time::sleep(IDLE_BACKOFF).await;
                    continue;
                }
                Err(err) => {
                    tracing::error!(error = %err, "task pop failed");
                    tokio::time::sleep(IDLE_BACKOFF).await;
                    continue;
                }
            };

            let Some(budget) = request_budget(task.expire_at, Utc::now().timestamp_millis())
            else {
                tracing::debug!(root_id = %task.root_id, "task already expired; skipping");
                continue;
            };

            tracing::info!(
                root_id = %task.root_id,
                budget_secs = budget.as_secs(),
                "request claimed"
            );

            let outcome = match tokio::time::timeout(budget, self.handle(&task)).await {
                Ok(result) => result,
                Err(_) => Err(WorkerError::RequestTimeout),
            };

            match outcome {
                Ok(()) => {
                    tracing::info!(root_id = %task.root_id, "request completed");
                }
                Err(err) if err.is_quiet() => {
                    tracing::debug!(
                        root_id = %task.root_id,
                        error = %err,
                        "request abandoned without FIN"
                    );
                }
                Err(err) => {
                    tracing::error!(
                        root_id = %task.root_id,
                        error = %err,
                        "request abandoned without FIN"
                    );
                }
            }

            handled += 1;
        }

        tracing::info!(requests = handled, "worker retiring");
        handled
    }

    /// Distributes one request and, on normal completion only, terminates
    /// its event stream with FIN.
    async fn handle(&mut self, task: &Task) -> Result<(), WorkerError> {
        self.distributor
            .process_request(&task.root_id, task.expire_at)
            .await?;
        self.coordinator
            .emit(&task.root_id, FIN, task.expire_at)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::MemoryCoordinator;
    use serde_json::Value;

    fn test_config(scanners_yaml: &str, max_files: u64, time_to_live: u64) -> BackendConfig {
        let mut config = BackendConfig::default();
        config.scanners = serde_yaml::from_str(scanners_yaml).unwrap();
        config.limits = Limits {
            max_files,
            time_to_live,
            max_depth: 5,
            distribution: 10,
        };
        config
    }

    fn worker(config: BackendConfig, coordinator: Arc<MemoryCoordinator>) -> Worker {
        Worker::from_config(config, coordinator).unwrap()
    }

    fn soon() -> i64 {
        Utc::now().timestamp() + 60
    }

    #[test]
    fn test_request_budget_rounds_up() {
        // 1.2s remaining rounds up to 2 whole seconds.
        assert_eq!(request_budget(11, 9800), Some(Duration::from_secs(2)));
        assert_eq!(request_budget(10, 10_000), None);
        assert_eq!(request_budget(9, 10_000), None);
    }

    #[tokio::test]
    async fn test_request_ends_with_single_fin() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        coordinator.enqueue("r1", soon());
        coordinator.stage_bytes("r1", b"hello world\n".to_vec());

        let mut worker = worker(test_config("{}", 1, 30), coordinator.clone());
        assert_eq!(worker.run().await, 1);

        let events = coordinator.events("r1");
        assert_eq!(events.len(), 2);
        assert_eq!(events.last().unwrap(), FIN);

        let fin_count = events.iter().filter(|e| e.as_slice() == FIN).count();
        assert_eq!(fin_count, 1);

        let first: Value = serde_json::from_slice(&events[0]).unwrap();
        assert_eq!(first["file"]["size"], 12);
        assert_eq!(first["file"]["tree"]["node"], "r1");
    }

    #[tokio::test]
    async fn test_events_precede_fin_for_archives() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        let archive = {
            use std::io::Write;
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
            writer
                .start_file("a.txt", zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(b"alpha").unwrap();
            writer.finish().unwrap().into_inner()
        };
        coordinator.enqueue("r1", soon());
        coordinator.stage_bytes("r1", archive);

        let yaml = "ScanZip:\n- positive:\n    flavors: [\"application/zip\"]\n";
        let mut worker = worker(test_config(yaml, 1, 30), coordinator.clone());
        worker.run().await;

        let events = coordinator.events("r1");
        assert_eq!(events.len(), 3);
        assert_eq!(events.last().unwrap(), FIN);

        let parent: Value = serde_json::from_slice(&events[0]).unwrap();
        let child: Value = serde_json::from_slice(&events[1]).unwrap();
        assert_eq!(parent["file"]["depth"], 0);
        assert_eq!(child["file"]["depth"], 1);
        assert_eq!(child["file"]["tree"]["parent"], "r1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_task_is_skipped_silently() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        coordinator.enqueue("r1", Utc::now().timestamp() - 10);
        coordinator.stage_bytes("r1", b"never read".to_vec());

        let mut worker = worker(test_config("{}", 1, 1), coordinator.clone());
        assert_eq!(worker.run().await, 0);

        // No events, no FIN, and the payload was never drained.
        assert!(coordinator.events("r1").is_empty());
        assert_eq!(coordinator.staged_chunks("r1"), 1);
    }

    #[tokio::test]
    async fn test_max_files_retires_worker() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        coordinator.enqueue("r1", soon());
        coordinator.stage_bytes("r1", b"first".to_vec());
        coordinator.enqueue("r2", soon() + 1);
        coordinator.stage_bytes("r2", b"second".to_vec());

        let mut worker = worker(test_config("{}", 1, 30), coordinator.clone());
        assert_eq!(worker.run().await, 1);

        assert_eq!(coordinator.events("r1").len(), 2);
        assert!(coordinator.events("r2").is_empty());
    }

    #[tokio::test]
    async fn test_requests_processed_in_expiry_order() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        let base = soon();
        coordinator.enqueue("later", base + 10);
        coordinator.stage_bytes("later", b"second".to_vec());
        coordinator.enqueue("sooner", base);
        coordinator.stage_bytes("sooner", b"first".to_vec());

        let mut worker = worker(test_config("{}", 2, 30), coordinator.clone());
        assert_eq!(worker.run().await, 2);

        assert_eq!(coordinator.events("sooner").len(), 2);
        assert_eq!(coordinator.events("later").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_fault_does_not_crash_worker() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        coordinator.set_faulty(true);

        let mut worker = worker(test_config("{}", 5, 1), coordinator.clone());
        // Runs out its lifetime budget on the idle backoff and retires.
        assert_eq!(worker.run().await, 0);
    }
}
