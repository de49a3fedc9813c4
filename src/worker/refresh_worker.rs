use crate::metrics;
use crate::refresh::{ExecutionOutcome, JobExecutor, RefreshArgs};
use crate::refresh_store::{QueuedRefresh, RefreshStore, RunStatus};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const PRUNE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Longest sleep between queue checks.
    pub poll_interval: Duration,
    /// Entries claimed per pass.
    pub batch_size: usize,
    pub history_retention: chrono::Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            batch_size: 16,
            history_retention: chrono::Duration::days(30),
        }
    }
}

/// Executes queued refreshes once they are due.
pub struct RefreshWorker {
    store: Arc<dyn RefreshStore>,
    executor: Arc<JobExecutor>,
    settings: WorkerSettings,
    shutdown_token: CancellationToken,
}

impl RefreshWorker {
    pub fn new(
        store: Arc<dyn RefreshStore>,
        executor: Arc<JobExecutor>,
        settings: WorkerSettings,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            store,
            executor,
            settings,
            shutdown_token,
        }
    }

    /// Main worker loop, returns once the shutdown token is cancelled.
    pub async fn run(&self) {
        info!(
            "Starting refresh worker (poll interval {:?}, batch size {})",
            self.settings.poll_interval, self.settings.batch_size
        );

        // On startup: recover entries claimed by a worker that died mid-run
        match self.store.reset_stale_running() {
            Ok(recovery) => {
                if recovery.requeued > 0 {
                    info!(
                        "Returned {} interrupted refreshes to the queue",
                        recovery.requeued
                    );
                }
                metrics::set_stale_resets(recovery.requeued, recovery.superseded);
            }
            Err(e) => {
                error!("Failed to recover interrupted refreshes: {}", e);
            }
        }

        self.prune_history();
        let mut last_prune = Instant::now();

        loop {
            if last_prune.elapsed() >= PRUNE_INTERVAL {
                self.prune_history();
                last_prune = Instant::now();
            }

            let sleep_duration = self.time_until_next_due();
            debug!("Worker sleeping for {:?}", sleep_duration);

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    self.run_due().await;
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Refresh worker received shutdown signal");
                    break;
                }
            }
        }

        info!("Refresh worker stopped");
    }

    /// Claim and execute one batch of due entries. Returns how many were
    /// executed.
    pub async fn run_due(&self) -> usize {
        let due = match self.store.claim_due(Utc::now(), self.settings.batch_size) {
            Ok(due) => due,
            Err(e) => {
                error!("Failed to claim due refreshes: {}", e);
                return 0;
            }
        };

        let mut executed = 0;
        for entry in due {
            // Claimed entries left behind are recovered on the next start
            if self.shutdown_token.is_cancelled() {
                warn!("Shutdown requested, leaving refresh {} claimed", entry.id);
                continue;
            }
            self.execute_entry(entry).await;
            executed += 1;
        }

        match self.store.pending_count() {
            Ok(count) => metrics::set_queue_pending(count),
            Err(e) => warn!("Failed to count pending refreshes: {}", e),
        }
        executed
    }

    async fn execute_entry(&self, entry: QueuedRefresh) {
        let report = RefreshArgs::from_json(&entry.args)
            .map(|args| args.report)
            .unwrap_or_else(|| "unknown".to_string());

        let run_id = match self.store.record_run_start(&entry.hook, &entry.args) {
            Ok(id) => Some(id),
            Err(e) => {
                error!("Failed to record run start for {}: {}", report, e);
                None
            }
        };

        info!("Running refresh {} ({})", entry.id, report);
        let start_time = Instant::now();
        let executor = Arc::clone(&self.executor);
        let hook = entry.hook.clone();
        let args = entry.args.clone();
        let result = tokio::task::spawn_blocking(move || executor.execute(&hook, &args)).await;
        let elapsed = start_time.elapsed();

        let (status, error_msg, status_label) = match result {
            Ok(outcome) => {
                let label = outcome.status_label();
                match outcome {
                    ExecutionOutcome::Refreshed { .. } => {
                        info!("Refresh of {} completed in {:?}", report, elapsed);
                        (RunStatus::Completed, None, label)
                    }
                    ExecutionOutcome::Failed { errors, .. } => {
                        (RunStatus::Failed, Some(errors.join("; ")), label)
                    }
                    ExecutionOutcome::Rejected(reason) => {
                        (RunStatus::Rejected, Some(reason.to_string()), label)
                    }
                }
            }
            Err(e) => {
                error!("Refresh of {} panicked after {:?}: {}", report, elapsed, e);
                (RunStatus::Failed, Some(format!("Task panic: {}", e)), "panic")
            }
        };

        metrics::record_job_execution(&report, status_label, elapsed);

        if let Some(run_id) = run_id {
            if let Err(e) = self.store.record_run_finish(run_id, status, error_msg) {
                error!("Failed to record run finish for {}: {}", report, e);
            }
        }
        if let Err(e) = self.store.complete_entry(entry.id) {
            error!("Failed to remove refresh {} from the queue: {}", entry.id, e);
        }
    }

    fn time_until_next_due(&self) -> Duration {
        let next_due = match self.store.next_due_at() {
            Ok(next_due) => next_due,
            Err(e) => {
                warn!("Failed to read next due refresh: {}", e);
                None
            }
        };

        match next_due {
            Some(at) => (at - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(self.settings.poll_interval),
            None => self.settings.poll_interval,
        }
    }

    fn prune_history(&self) {
        let cutoff = Utc::now() - self.settings.history_retention;
        match self.store.prune_run_history(cutoff) {
            Ok(0) => {}
            Ok(count) => info!("Pruned {} refresh runs older than {}", count, cutoff),
            Err(e) => error!("Failed to prune refresh history: {}", e),
        }
    }
}
