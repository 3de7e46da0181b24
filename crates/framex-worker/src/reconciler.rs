//! Background sweep that fails orphaned `processing` jobs.
//!
//! A worker refreshes `heartbeat_at` while it runs. If the process dies the
//! lease goes stale and this sweep moves the job to `failed`, so clients
//! never watch a job that will not finish.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use framex_models::{JobEvent, JobStatus};
use framex_store::StoreError;

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::notifier;
use crate::retry::FailureTracker;

/// Error recorded on jobs failed by the sweep.
pub const STALE_JOB_ERROR: &str = "processing timed out: worker stopped responding";

/// Stale job reconciler.
pub struct StaleJobReconciler {
    ctx: Arc<ProcessingContext>,
}

impl StaleJobReconciler {
    pub fn new(ctx: Arc<ProcessingContext>) -> Self {
        Self { ctx }
    }

    /// Sweep every `reconcile_interval` until `shutdown` reads `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting stale job reconciler (interval: {:?}, threshold: {:?})",
            self.ctx.config.reconcile_interval, self.ctx.config.stale_threshold
        );

        let mut ticker = interval(self.ctx.config.reconcile_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures = FailureTracker::new(3);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.reconcile_once().await {
                        Ok(_) => failures.record_success(),
                        Err(e) => {
                            if failures.record_failure() {
                                error!("Stale job reconciliation error: {}", e);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Run a single sweep. Returns the number of jobs failed.
    pub async fn reconcile_once(&self) -> WorkerResult<u32> {
        let threshold = chrono::Duration::from_std(self.ctx.config.stale_threshold)
            .map_err(|e| WorkerError::config_error(format!("stale threshold: {}", e)))?;

        let jobs = self.ctx.jobs.list().await?;
        let now = Utc::now();
        let mut recovered = 0u32;

        for job in jobs {
            if job.status != JobStatus::Processing || !job.is_stale(threshold, now) {
                continue;
            }

            warn!(
                job_id = %job.id,
                file_id = %job.file_id,
                last_heartbeat = ?job.heartbeat_at,
                "Detected stale job (no heartbeat)"
            );

            let update = self
                .ctx
                .jobs
                .update(&job.id, |job| job.fail_stale(threshold, Utc::now(), STALE_JOB_ERROR))
                .await;

            match update {
                Ok(failed) => {
                    recovered += 1;
                    metrics::counter!("framex_jobs_reconciled_total").increment(1);
                    info!(job_id = %failed.id, "Failed stale job");
                    notifier::dispatch(Arc::clone(&self.ctx.notifier), JobEvent::from(&failed));
                }
                // Heartbeat landed, job finished, or record expired meanwhile.
                Err(StoreError::Transition(_)) | Err(StoreError::NotFound(_)) => {}
                Err(e) => error!(job_id = %job.id, "Failed to recover stale job: {}", e),
            }
        }

        if recovered > 0 {
            info!("Stale job reconciliation complete: {} recovered", recovered);
        }
        Ok(recovered)
    }
}
