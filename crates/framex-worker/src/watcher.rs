//! Per-job heartbeat and cancellation watcher.
//!
//! While a job runs, the watcher refreshes its lease and re-reads the record
//! to notice a cancel written by the API, or a terminal status written by
//! another actor such as the stale job reconciler. Either trips the job's
//! cancellation token, which also kills a running ffmpeg process.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use framex_models::JobId;
use framex_store::StoreError;

use crate::context::ProcessingContext;
use crate::retry::FailureTracker;

/// Running watcher task.
pub struct JobWatcher {
    stop_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl JobWatcher {
    /// Start watching `job_id`; `cancel_tx` is set to `true` once the job
    /// is ended by another writer.
    pub fn spawn(
        ctx: Arc<ProcessingContext>,
        job_id: JobId,
        cancel_tx: watch::Sender<bool>,
    ) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(watch_job(ctx, job_id, cancel_tx, stop_rx));
        Self {
            stop_tx: Some(stop_tx),
            handle,
        }
    }

    /// Stop the watcher and wait for it to exit.
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        let _ = (&mut self.handle).await;
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn watch_job(
    ctx: Arc<ProcessingContext>,
    job_id: JobId,
    cancel_tx: watch::Sender<bool>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut heartbeat = ticker(ctx.config.heartbeat_interval);
    let mut poll = ticker(ctx.config.cancel_poll_interval);
    let mut failures = FailureTracker::new(3);

    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            _ = heartbeat.tick() => {
                match ctx.jobs.update(&job_id, |job| job.heartbeat()).await {
                    Ok(_) => failures.record_success(),
                    Err(StoreError::Transition(e)) => {
                        debug!(job_id = %job_id, status = %e.current(), "Job ended elsewhere, observed on heartbeat");
                        let _ = cancel_tx.send(true);
                        break;
                    }
                    Err(e) => {
                        if failures.record_failure() {
                            warn!(job_id = %job_id, "Heartbeat failed: {}", e);
                        }
                    }
                }
            }
            _ = poll.tick() => {
                match ctx.jobs.get(&job_id).await {
                    Ok(Some(job)) if job.is_terminal() => {
                        debug!(job_id = %job_id, status = %job.status, "Job ended elsewhere");
                        let _ = cancel_tx.send(true);
                        break;
                    }
                    Ok(_) => failures.record_success(),
                    Err(e) => {
                        if failures.record_failure() {
                            warn!(job_id = %job_id, "Cancellation poll failed: {}", e);
                        }
                    }
                }
            }
        }
    }
}
