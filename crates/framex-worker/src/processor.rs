//! Frame extraction pipeline for a single job.
//!
//! The worker owns the job from the `pending -> processing` write until it
//! writes a terminal state. Every write goes through `JobRepository::update`,
//! so a cancel from the API and the worker's own writes are serialized and
//! the state machine decides which one wins.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::Instrument;

use framex_media::{list_frames, package_frames, MediaError};
use framex_models::{
    Job, JobEvent, JobId, JobStatus, PROGRESS_EXTRACTING, PROGRESS_FRAMES_LISTED,
};
use framex_store::StoreError;

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::notifier;
use crate::retry::{retry_async, RetryConfig};
use crate::watcher::JobWatcher;

const OPERATION: &str = "frame_extraction";

/// How a job run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// The record was missing or not pending; nothing was written.
    Skipped,
    Completed(Job),
    Failed(Job),
    /// A cancel ended the job first.
    Cancelled,
    /// Another writer, such as the stale job reconciler, moved the job to
    /// this terminal status first.
    Superseded(JobStatus),
}

impl JobOutcome {
    pub fn status(&self) -> Option<JobStatus> {
        match self {
            JobOutcome::Skipped => None,
            JobOutcome::Completed(_) => Some(JobStatus::Completed),
            JobOutcome::Failed(_) => Some(JobStatus::Failed),
            JobOutcome::Cancelled => Some(JobStatus::Cancelled),
            JobOutcome::Superseded(status) => Some(*status),
        }
    }
}

/// Artifact produced by the stages.
struct Produced {
    output_name: String,
    frame_count: u32,
}

/// Run the pipeline for `job_id` inside a job span.
pub async fn process_job(ctx: Arc<ProcessingContext>, job_id: JobId) -> WorkerResult<JobOutcome> {
    let logger = JobLogger::new(&job_id, OPERATION);
    let span = logger.span();
    run(ctx, job_id, logger).instrument(span).await
}

async fn run(ctx: Arc<ProcessingContext>, job_id: JobId, logger: JobLogger) -> WorkerResult<JobOutcome> {
    let job = match ctx.jobs.get(&job_id).await? {
        Some(job) => job,
        None => {
            logger.skipped("record missing or expired");
            return Ok(JobOutcome::Skipped);
        }
    };
    if job.status != JobStatus::Pending {
        logger.skipped(format_args!("job is {}", job.status));
        return Ok(JobOutcome::Skipped);
    }

    let job = match ctx.jobs.update(&job_id, |job| job.start()).await {
        Ok(job) => job,
        Err(StoreError::Transition(e)) => {
            logger.skipped(format_args!("job became {} before start", e.current()));
            return Ok(JobOutcome::Skipped);
        }
        Err(StoreError::NotFound(_)) => {
            logger.skipped("record expired before start");
            return Ok(JobOutcome::Skipped);
        }
        Err(e) => return Err(e.into()),
    };
    logger.started(&job.file_id);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let watcher = JobWatcher::spawn(Arc::clone(&ctx), job_id.clone(), cancel_tx);

    let result = run_stages(&ctx, &job, cancel_rx, &logger).await;

    watcher.stop().await;

    let outcome = finish(&ctx, &job_id, result, &logger).await?;
    match &outcome {
        JobOutcome::Completed(job) | JobOutcome::Failed(job) => {
            notifier::dispatch(Arc::clone(&ctx.notifier), JobEvent::from(job));
        }
        JobOutcome::Cancelled | JobOutcome::Superseded(_) | JobOutcome::Skipped => {}
    }
    Ok(outcome)
}

/// Write the terminal state for a finished run.
async fn finish(
    ctx: &ProcessingContext,
    job_id: &JobId,
    result: WorkerResult<Produced>,
    logger: &JobLogger,
) -> WorkerResult<JobOutcome> {
    match result {
        Ok(produced) => {
            let update = ctx
                .jobs
                .update(job_id, |job| {
                    job.complete(produced.output_name.clone(), produced.frame_count)
                })
                .await;
            match update {
                Ok(job) => {
                    metrics::counter!("framex_jobs_completed_total").increment(1);
                    logger.completed(produced.frame_count, &produced.output_name);
                    Ok(JobOutcome::Completed(job))
                }
                Err(StoreError::Transition(_)) => ended_elsewhere(ctx, job_id, logger).await,
                Err(e) => Err(e.into()),
            }
        }
        Err(WorkerError::Cancelled) => ended_elsewhere(ctx, job_id, logger).await,
        Err(err) => {
            let message = err.to_string();
            logger.failed(&message);
            match ctx.jobs.update(job_id, |job| job.fail(message.clone())).await {
                Ok(job) => {
                    metrics::counter!("framex_jobs_failed_total").increment(1);
                    Ok(JobOutcome::Failed(job))
                }
                Err(StoreError::Transition(_)) => ended_elsewhere(ctx, job_id, logger).await,
                Err(e) => Err(e.into()),
            }
        }
    }
}

/// Outcome of a run whose job was ended by another writer. The record
/// is left as that writer wrote it.
async fn ended_elsewhere(
    ctx: &ProcessingContext,
    job_id: &JobId,
    logger: &JobLogger,
) -> WorkerResult<JobOutcome> {
    match ctx.jobs.get(job_id).await? {
        Some(job) if job.is_terminal() && job.status != JobStatus::Cancelled => {
            logger.superseded(job.status);
            Ok(JobOutcome::Superseded(job.status))
        }
        _ => {
            logger.cancelled("stopped before the result was recorded");
            Ok(JobOutcome::Cancelled)
        }
    }
}

async fn run_stages(
    ctx: &ProcessingContext,
    job: &Job,
    cancel_rx: watch::Receiver<bool>,
    logger: &JobLogger,
) -> WorkerResult<Produced> {
    tokio::fs::create_dir_all(&ctx.config.work_dir).await?;
    // Removed on drop, on every exit path.
    let scratch = tempfile::Builder::new()
        .prefix(&format!("job-{}-", job.id))
        .tempdir_in(&ctx.config.work_dir)?;

    let input = locate_input(ctx, &job.file_id).await?;

    // Stage A: extraction
    ensure_not_cancelled(&cancel_rx)?;
    checkpoint(ctx, &job.id, PROGRESS_EXTRACTING).await?;
    logger.stage(PROGRESS_EXTRACTING, format_args!("extracting frames from {}", input.display()));
    extract_frames(ctx, &input, scratch.path(), &cancel_rx).await?;

    // Stage B: enumeration
    ensure_not_cancelled(&cancel_rx)?;
    let frames = list_frames(scratch.path()).await?;
    if frames.is_empty() {
        return Err(MediaError::NoFrames.into());
    }
    let frame_count = u32::try_from(frames.len())
        .map_err(|_| WorkerError::from(MediaError::internal("frame count overflow")))?;
    checkpoint(ctx, &job.id, PROGRESS_FRAMES_LISTED).await?;
    logger.stage(PROGRESS_FRAMES_LISTED, format_args!("{} frames extracted", frame_count));

    // Stage C: packaging
    ensure_not_cancelled(&cancel_rx)?;
    let archive = tokio::task::spawn_blocking(move || package_frames(&frames))
        .await
        .map_err(|e| MediaError::internal(format!("packaging task failed: {}", e)))??;

    let output_name = job.id.output_name();
    ctx.outputs.store(&output_name, archive).await?;

    Ok(Produced {
        output_name,
        frame_count,
    })
}

async fn locate_input(ctx: &ProcessingContext, file_id: &str) -> WorkerResult<PathBuf> {
    ctx.uploads.locate(file_id).await.map_err(|e| {
        if e.is_not_found() {
            WorkerError::InputNotFound(file_id.to_string())
        } else {
            e.into()
        }
    })
}

/// Run the extractor, retrying tool failures with a clean scratch directory.
async fn extract_frames(
    ctx: &ProcessingContext,
    input: &Path,
    scratch: &Path,
    cancel_rx: &watch::Receiver<bool>,
) -> WorkerResult<()> {
    let retry = RetryConfig::new("frame extraction")
        .with_max_retries(ctx.config.tool_retries)
        .with_base_delay(ctx.config.tool_retry_delay);

    retry_async(
        &retry,
        |attempt| {
            let extractor = Arc::clone(&ctx.extractor);
            let cancel = cancel_rx.clone();
            async move {
                if attempt > 0 {
                    ensure_not_cancelled(&cancel)?;
                    clear_dir(scratch).await?;
                }
                extractor
                    .extract(input, scratch, cancel)
                    .await
                    .map_err(WorkerError::from)
            }
        },
        WorkerError::is_retryable,
    )
    .await
}

async fn clear_dir(dir: &Path) -> WorkerResult<()> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(entry.path()).await?;
        } else {
            tokio::fs::remove_file(entry.path()).await?;
        }
    }
    Ok(())
}

/// Record a progress checkpoint. A rejected write means another writer
/// already moved the job out of `processing`.
async fn checkpoint(ctx: &ProcessingContext, job_id: &JobId, progress: u8) -> WorkerResult<()> {
    match ctx.jobs.update(job_id, |job| job.record_progress(progress)).await {
        Ok(_) => Ok(()),
        Err(StoreError::Transition(_)) => Err(WorkerError::Cancelled),
        Err(e) => Err(e.into()),
    }
}

fn ensure_not_cancelled(cancel_rx: &watch::Receiver<bool>) -> WorkerResult<()> {
    if *cancel_rx.borrow() {
        return Err(WorkerError::Cancelled);
    }
    Ok(())
}
