//! Dispatcher: hands queued job ids to a bounded pool of workers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

use framex_models::JobId;
use framex_queue::WorkQueue;

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::processor::{process_job, JobOutcome};

/// Single dispatcher loop over a fixed-size worker pool.
///
/// A slot is acquired before dequeuing, so a burst of submissions waits in
/// the queue instead of spawning unbounded ffmpeg processes.
pub struct Dispatcher {
    ctx: Arc<ProcessingContext>,
    queue: Arc<dyn WorkQueue>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<ProcessingContext>, queue: Arc<dyn WorkQueue>) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        Self {
            ctx,
            queue,
            job_semaphore,
            shutdown,
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Number of workers currently running.
    pub fn active_jobs(&self) -> usize {
        self.ctx.config.max_concurrent_jobs - self.job_semaphore.available_permits()
    }

    /// Run until shutdown, then wait for in-flight workers.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting dispatcher with {} max concurrent jobs",
            self.ctx.config.max_concurrent_jobs
        );

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                info!("Shutdown signal received, stopping dispatcher");
                break;
            }

            let permit = tokio::select! {
                _ = shutdown_rx.changed() => continue,
                permit = Arc::clone(&self.job_semaphore).acquire_owned() => {
                    permit.map_err(|_| WorkerError::config_error("worker pool closed"))?
                }
            };

            // Not raced against shutdown: dropping a pop mid-flight could lose the id.
            match self.queue.dequeue(self.ctx.config.dequeue_timeout).await {
                Ok(Some(job_id)) => {
                    debug!(job_id = %job_id, "Dispatching job");
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        let _permit = permit;
                        execute_job(ctx, job_id).await;
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    drop(permit);
                    error!("Error dequeuing job: {}", e);
                    tokio::select! {
                        _ = shutdown_rx.changed() => {}
                        _ = tokio::time::sleep(self.ctx.config.dequeue_backoff) => {}
                    }
                }
            }
        }

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.ctx.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "{} jobs still running after {:?}, exiting anyway",
                self.active_jobs(),
                self.ctx.config.shutdown_timeout
            );
        }

        info!("Dispatcher stopped");
        Ok(())
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        loop {
            if self.job_semaphore.available_permits() == self.ctx.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Run one job and log how it ended.
async fn execute_job(ctx: Arc<ProcessingContext>, job_id: JobId) {
    metrics::gauge!("framex_workers_active").increment(1.0);

    match process_job(ctx, job_id.clone()).await {
        Ok(JobOutcome::Completed(_)) => info!(job_id = %job_id, "Job completed successfully"),
        Ok(JobOutcome::Failed(job)) => warn!(
            job_id = %job_id,
            error = job.error.as_deref().unwrap_or_default(),
            "Job failed"
        ),
        Ok(JobOutcome::Cancelled) => info!(job_id = %job_id, "Job cancelled"),
        Ok(JobOutcome::Superseded(status)) => {
            info!(job_id = %job_id, %status, "Job ended by another writer")
        }
        Ok(JobOutcome::Skipped) => debug!(job_id = %job_id, "Job skipped"),
        Err(e) => error!(job_id = %job_id, "Job {} aborted: {}", job_id, e),
    }

    metrics::gauge!("framex_workers_active").decrement(1.0);
}
