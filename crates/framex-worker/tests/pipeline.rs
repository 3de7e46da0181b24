//! End-to-end pipeline tests over in-memory collaborators.

use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;
use tokio::sync::watch;

use framex_media::{FrameExtractor, MediaError, MediaResult};
use framex_models::{Job, JobEvent, JobId, JobStatus};
use framex_queue::{MemoryWorkQueue, WorkQueue};
use framex_storage::{LocalUploadStore, MemoryOutputStore};
use framex_store::{JobRepository, JobStore, MemoryJobStore, StoreResult};
use framex_worker::{
    process_job, Dispatcher, JobOutcome, NotificationSink, ProcessingContext, StaleJobReconciler,
    WorkerConfig, WorkerResult, STALE_JOB_ERROR,
};

/// Writes a fixed number of frames, optionally after a delay or failures.
struct ScriptedExtractor {
    frames: usize,
    delay: Duration,
    failures: AtomicU32,
    failure_message: String,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedExtractor {
    fn new(frames: usize) -> Self {
        Self {
            frames,
            delay: Duration::ZERO,
            failures: AtomicU32::new(0),
            failure_message: String::new(),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn failing(mut self, times: u32, message: &str) -> Self {
        self.failures = AtomicU32::new(times);
        self.failure_message = message.to_string();
        self
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameExtractor for ScriptedExtractor {
    async fn extract(
        &self,
        _input: &Path,
        output_dir: &Path,
        mut cancel: watch::Receiver<bool>,
    ) -> MediaResult<()> {
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        let result = async {
            if !self.delay.is_zero() {
                tokio::select! {
                    Ok(_) = cancel.wait_for(|cancelled| *cancelled) => return Err(MediaError::Cancelled),
                    _ = tokio::time::sleep(self.delay) => {}
                }
            }
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(MediaError::ffmpeg_failed(self.failure_message.clone(), Some(1)));
            }
            for i in 1..=self.frames {
                tokio::fs::write(output_dir.join(format!("frame_{:04}.png", i)), b"png").await?;
            }
            Ok(())
        }
        .await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Records every event it receives.
#[derive(Default)]
struct RecordingNotifier {
    events: Mutex<Vec<JobEvent>>,
}

impl RecordingNotifier {
    fn events(&self) -> Vec<JobEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify(&self, event: &JobEvent) -> WorkerResult<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Memory store that records `(status, progress)` of every write.
#[derive(Default)]
struct RecordingStore {
    inner: MemoryJobStore,
    writes: Mutex<Vec<(JobStatus, u8)>>,
}

impl RecordingStore {
    fn writes(&self) -> Vec<(JobStatus, u8)> {
        self.writes.lock().unwrap().clone()
    }

    fn record(&self, job: &Job) {
        self.writes.lock().unwrap().push((job.status, job.progress));
    }
}

#[async_trait]
impl JobStore for RecordingStore {
    async fn insert(&self, job: &Job) -> StoreResult<()> {
        self.inner.insert(job).await?;
        self.record(job);
        Ok(())
    }

    async fn put(&self, job: &Job) -> StoreResult<()> {
        self.inner.put(job).await?;
        self.record(job);
        Ok(())
    }

    async fn get(&self, id: &JobId) -> StoreResult<Option<Job>> {
        self.inner.get(id).await
    }

    async fn list(&self) -> StoreResult<Vec<Job>> {
        self.inner.list().await
    }

    async fn compare_and_put(&self, job: &Job, expected_version: u64) -> StoreResult<()> {
        self.inner.compare_and_put(job, expected_version).await?;
        self.record(job);
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }
}

struct Harness {
    _dir: TempDir,
    ctx: Arc<ProcessingContext>,
    outputs: Arc<MemoryOutputStore>,
    notifier: Arc<RecordingNotifier>,
}

impl Harness {
    fn new(extractor: Arc<ScriptedExtractor>) -> Self {
        Self::with_store(extractor, Arc::new(MemoryJobStore::default()), 4)
    }

    fn with_store(
        extractor: Arc<ScriptedExtractor>,
        store: Arc<dyn JobStore>,
        max_concurrent_jobs: usize,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        std::fs::write(uploads.join("abc123_clip.mp4"), b"video").unwrap();

        let config = WorkerConfig {
            max_concurrent_jobs,
            work_dir: dir.path().join("processing"),
            tool_retry_delay: Duration::from_millis(10),
            heartbeat_interval: Duration::from_millis(50),
            cancel_poll_interval: Duration::from_millis(20),
            shutdown_timeout: Duration::from_secs(5),
            dequeue_timeout: Duration::from_millis(50),
            dequeue_backoff: Duration::from_millis(50),
            ..WorkerConfig::default()
        };

        let outputs = Arc::new(MemoryOutputStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = ProcessingContext::new(
            config,
            JobRepository::new(store),
            Arc::new(LocalUploadStore::new(uploads)),
            outputs.clone(),
            extractor,
            notifier.clone(),
        );

        Self {
            _dir: dir,
            ctx: Arc::new(ctx),
            outputs,
            notifier,
        }
    }

    fn jobs(&self) -> &JobRepository {
        &self.ctx.jobs
    }

    async fn submit(&self, file_id: &str) -> Job {
        let job = Job::new(file_id);
        self.jobs().create(&job).await.unwrap();
        job
    }

    async fn record(&self, id: &JobId) -> Job {
        self.jobs().require(id).await.unwrap()
    }

    async fn wait_for_status(&self, id: &JobId, status: JobStatus) -> Job {
        for _ in 0..500 {
            let job = self.record(id).await;
            if job.status == status {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached {}", id, status);
    }

    async fn wait_for_events(&self, count: usize) -> Vec<JobEvent> {
        for _ in 0..200 {
            let events = self.notifier.events();
            if events.len() >= count {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} notifications", count);
    }
}

#[tokio::test]
async fn test_job_completes_with_archive() {
    let harness = Harness::new(Arc::new(ScriptedExtractor::new(3)));
    let job = harness.submit("abc123").await;

    let outcome = process_job(harness.ctx.clone(), job.id.clone()).await.unwrap();
    assert_eq!(outcome.status(), Some(JobStatus::Completed));

    let stored = harness.record(&job.id).await;
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.progress, 100);
    assert_eq!(stored.frame_count, Some(3));
    assert_eq!(stored.output_name, Some(format!("frames_{}.zip", job.id)));
    assert!(stored.started_at.is_some());
    assert!(stored.completed_at.is_some());
    assert!(stored.error.is_none());

    let archive = harness.outputs.get(&job.id.output_name()).await.unwrap();
    assert!(archive.starts_with(b"PK"));

    let events = harness.wait_for_events(1).await;
    assert_eq!(events[0].job_id, job.id);
    assert_eq!(events[0].status, JobStatus::Completed);
    assert_eq!(events[0].frame_count, Some(3));
}

#[tokio::test]
async fn test_missing_input_fails_job() {
    let harness = Harness::new(Arc::new(ScriptedExtractor::new(3)));
    let job = harness.submit("missing").await;

    let outcome = process_job(harness.ctx.clone(), job.id.clone()).await.unwrap();
    assert_eq!(outcome.status(), Some(JobStatus::Failed));

    let stored = harness.record(&job.id).await;
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(
        stored.error.as_deref(),
        Some("input file not found for file ID: missing")
    );
    assert!(stored.output_name.is_none());
    assert!(harness.outputs.names().await.is_empty());

    let events = harness.wait_for_events(1).await;
    assert_eq!(events[0].status, JobStatus::Failed);
}

#[tokio::test]
async fn test_tool_failure_message_is_recorded() {
    let extractor =
        ScriptedExtractor::new(3).failing(1, "Invalid data found when processing input");
    let harness = Harness::new(Arc::new(extractor));
    let job = harness.submit("abc123").await;

    process_job(harness.ctx.clone(), job.id.clone()).await.unwrap();

    let stored = harness.record(&job.id).await;
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(
        stored.error.as_deref(),
        Some("ffmpeg error: Invalid data found when processing input")
    );
}

#[tokio::test]
async fn test_tool_failure_is_retried_when_enabled() {
    let extractor = Arc::new(ScriptedExtractor::new(2).failing(1, "transient"));
    let mut harness = Harness::new(extractor);
    Arc::get_mut(&mut harness.ctx).unwrap().config.tool_retries = 1;
    let job = harness.submit("abc123").await;

    let outcome = process_job(harness.ctx.clone(), job.id.clone()).await.unwrap();
    assert_eq!(outcome.status(), Some(JobStatus::Completed));
    assert_eq!(harness.record(&job.id).await.frame_count, Some(2));
}

#[tokio::test]
async fn test_no_frames_fails_job() {
    let harness = Harness::new(Arc::new(ScriptedExtractor::new(0)));
    let job = harness.submit("abc123").await;

    process_job(harness.ctx.clone(), job.id.clone()).await.unwrap();

    let stored = harness.record(&job.id).await;
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.error.as_deref(), Some("no frames extracted from video"));
}

#[tokio::test]
async fn test_cancel_before_dispatch_never_processes() {
    let store = Arc::new(RecordingStore::default());
    let harness = Harness::with_store(Arc::new(ScriptedExtractor::new(3)), store.clone(), 1);
    let job = harness.submit("abc123").await;
    harness.jobs().update(&job.id, |job| job.cancel()).await.unwrap();

    let outcome = process_job(harness.ctx.clone(), job.id.clone()).await.unwrap();
    assert_eq!(outcome, JobOutcome::Skipped);

    let stored = harness.record(&job.id).await;
    assert_eq!(stored.status, JobStatus::Cancelled);
    assert!(stored.started_at.is_none());
    assert!(store
        .writes()
        .iter()
        .all(|(status, _)| *status != JobStatus::Processing));
    assert!(harness.outputs.names().await.is_empty());
}

#[tokio::test]
async fn test_cancel_during_extraction_stops_job() {
    let extractor = ScriptedExtractor::new(3).with_delay(Duration::from_secs(30));
    let harness = Harness::new(Arc::new(extractor));
    let job = harness.submit("abc123").await;

    let ctx = harness.ctx.clone();
    let id = job.id.clone();
    let run = tokio::spawn(async move { process_job(ctx, id).await });

    harness.wait_for_status(&job.id, JobStatus::Processing).await;
    harness.jobs().update(&job.id, |job| job.cancel()).await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, JobOutcome::Cancelled);

    let stored = harness.record(&job.id).await;
    assert_eq!(stored.status, JobStatus::Cancelled);
    assert!(stored.output_name.is_none());
    assert!(harness.outputs.names().await.is_empty());
}

#[tokio::test]
async fn test_external_failure_stops_extraction() {
    let extractor = ScriptedExtractor::new(3).with_delay(Duration::from_secs(30));
    let harness = Harness::new(Arc::new(extractor));
    let job = harness.submit("abc123").await;

    let ctx = harness.ctx.clone();
    let id = job.id.clone();
    let run = tokio::spawn(async move { process_job(ctx, id).await });

    harness.wait_for_status(&job.id, JobStatus::Processing).await;
    harness
        .jobs()
        .update(&job.id, |job| job.fail(STALE_JOB_ERROR))
        .await
        .unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("extraction stopped")
        .unwrap()
        .unwrap();
    assert_eq!(outcome, JobOutcome::Superseded(JobStatus::Failed));
    assert_eq!(outcome.status(), Some(JobStatus::Failed));

    let stored = harness.record(&job.id).await;
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.error.as_deref(), Some(STALE_JOB_ERROR));
    assert!(stored.output_name.is_none());
    assert!(harness.outputs.names().await.is_empty());
}

#[tokio::test]
async fn test_progress_never_decreases() {
    let store = Arc::new(RecordingStore::default());
    let harness = Harness::with_store(Arc::new(ScriptedExtractor::new(4)), store.clone(), 1);
    let job = harness.submit("abc123").await;

    process_job(harness.ctx.clone(), job.id.clone()).await.unwrap();

    let progress: Vec<u8> = store.writes().iter().map(|(_, p)| *p).collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{:?}", progress);
    assert_eq!(progress.last(), Some(&100));
    assert!(progress.contains(&10));
    assert!(progress.contains(&70));
}

#[tokio::test]
async fn test_dispatcher_respects_pool_size() {
    let extractor = Arc::new(ScriptedExtractor::new(1).with_delay(Duration::from_millis(100)));
    let harness = Harness::with_store(
        extractor.clone(),
        Arc::new(MemoryJobStore::default()),
        2,
    );
    let queue = Arc::new(MemoryWorkQueue::new());

    let mut ids = Vec::new();
    for _ in 0..6 {
        let job = harness.submit("abc123").await;
        queue.enqueue(&job.id).await.unwrap();
        ids.push(job.id);
    }

    let dispatcher = Arc::new(Dispatcher::new(harness.ctx.clone(), queue.clone()));
    let runner = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.run().await })
    };

    for id in &ids {
        harness.wait_for_status(id, JobStatus::Completed).await;
    }
    dispatcher.shutdown();
    runner.await.unwrap().unwrap();

    assert!(extractor.peak() <= 2, "peak concurrency {}", extractor.peak());
    assert_eq!(queue.len().await.unwrap(), 0);
    assert_eq!(harness.jobs().list().await.unwrap().len(), 6);
}

#[tokio::test]
async fn test_reconciler_fails_only_stale_jobs() {
    let harness = Harness::new(Arc::new(ScriptedExtractor::new(1)));
    let now = Utc::now();

    let mut stale = Job::new("abc123");
    stale.start().unwrap();
    stale.started_at = Some(now - chrono::Duration::minutes(10));
    stale.heartbeat_at = Some(now - chrono::Duration::minutes(10));
    harness.jobs().create(&stale).await.unwrap();

    let mut fresh = Job::new("abc123");
    fresh.start().unwrap();
    harness.jobs().create(&fresh).await.unwrap();

    let pending = harness.submit("abc123").await;

    let reconciler = StaleJobReconciler::new(harness.ctx.clone());
    assert_eq!(reconciler.reconcile_once().await.unwrap(), 1);

    let stale = harness.record(&stale.id).await;
    assert_eq!(stale.status, JobStatus::Failed);
    assert_eq!(stale.error.as_deref(), Some(STALE_JOB_ERROR));

    assert_eq!(harness.record(&fresh.id).await.status, JobStatus::Processing);
    assert_eq!(harness.record(&pending.id).await.status, JobStatus::Pending);

    // A second sweep finds nothing left to do.
    assert_eq!(reconciler.reconcile_once().await.unwrap(), 0);
}
