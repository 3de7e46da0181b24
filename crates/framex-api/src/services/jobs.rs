//! Job submission, status, listing and cancellation.

use std::sync::Arc;

use tracing::{error, info, warn};

use framex_models::{Job, JobId};
use framex_queue::WorkQueue;
use framex_store::{JobRepository, StoreError};

use crate::error::{ApiError, ApiResult};
use crate::metrics;

/// Job API over the record store and the work queue.
#[derive(Clone)]
pub struct JobService {
    jobs: JobRepository,
    queue: Arc<dyn WorkQueue>,
}

impl JobService {
    pub fn new(jobs: JobRepository, queue: Arc<dyn WorkQueue>) -> Self {
        Self { jobs, queue }
    }

    pub fn repository(&self) -> &JobRepository {
        &self.jobs
    }

    pub fn queue(&self) -> &Arc<dyn WorkQueue> {
        &self.queue
    }

    /// Create a pending job for `file_id` and queue it.
    ///
    /// If the id cannot be queued the record is marked failed, so it never
    /// sits in `pending` forever.
    pub async fn submit(&self, file_id: &str) -> ApiResult<Job> {
        let file_id = file_id.trim();
        if file_id.is_empty() {
            return Err(ApiError::bad_request("file_id is required"));
        }

        let job = Job::new(file_id);
        self.jobs.create(&job).await?;

        if let Err(e) = self.queue.enqueue(&job.id).await {
            error!(job_id = %job.id, file_id = %file_id, "Failed to enqueue job: {}", e);
            let message = format!("failed to queue job: {}", e);
            if let Err(mark_err) = self.jobs.update(&job.id, |job| job.fail(message.clone())).await {
                warn!(job_id = %job.id, "Failed to mark unqueued job as failed: {}", mark_err);
            }
            return Err(e.into());
        }

        metrics::record_job_submitted();
        info!(job_id = %job.id, file_id = %file_id, "Job submitted");
        Ok(job)
    }

    /// Current record of a job.
    pub async fn status(&self, job_id: &JobId) -> ApiResult<Job> {
        self.jobs
            .get(job_id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("job {} not found", job_id)))
    }

    /// All live jobs, newest first.
    pub async fn list(&self) -> ApiResult<Vec<Job>> {
        let mut jobs = self.jobs.list().await?;
        jobs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        Ok(jobs)
    }

    /// Cancel a pending or processing job.
    ///
    /// Goes through the same serialized update path as the worker, so a
    /// cancel and a completion cannot overwrite each other.
    pub async fn cancel(&self, job_id: &JobId) -> ApiResult<Job> {
        match self.jobs.update(job_id, |job| job.cancel()).await {
            Ok(job) => {
                metrics::record_job_cancelled();
                info!(job_id = %job_id, "Job cancelled");
                Ok(job)
            }
            Err(StoreError::NotFound(_)) => {
                Err(ApiError::not_found(format!("job {} not found", job_id)))
            }
            Err(StoreError::Transition(e)) => Err(ApiError::invalid_state(format!(
                "job already {}",
                e.current()
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use framex_models::JobStatus;
    use framex_queue::{MemoryWorkQueue, QueueError, QueueResult};
    use framex_store::MemoryJobStore;
    use std::time::Duration;

    fn service() -> (JobService, Arc<MemoryWorkQueue>) {
        let queue = Arc::new(MemoryWorkQueue::new());
        let jobs = JobRepository::new(Arc::new(MemoryJobStore::default()));
        (JobService::new(jobs, queue.clone()), queue)
    }

    struct BrokenQueue;

    #[async_trait]
    impl WorkQueue for BrokenQueue {
        async fn enqueue(&self, _job_id: &JobId) -> QueueResult<()> {
            Err(QueueError::enqueue_failed("connection refused"))
        }

        async fn dequeue(&self, _timeout: Duration) -> QueueResult<Option<JobId>> {
            Ok(None)
        }

        async fn len(&self) -> QueueResult<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_submit_creates_pending_job_and_queues_it() {
        let (service, queue) = service();

        let job = service.submit("abc123").await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.file_id, "abc123");

        assert_eq!(service.status(&job.id).await.unwrap().status, JobStatus::Pending);
        let queued = queue.dequeue(Duration::from_millis(10)).await.unwrap();
        assert_eq!(queued, Some(job.id));
    }

    #[tokio::test]
    async fn test_submit_rejects_blank_file_id() {
        let (service, queue) = service();

        for file_id in ["", "   "] {
            let err = service.submit(file_id).await.unwrap_err();
            assert!(matches!(err, ApiError::BadRequest(_)));
        }
        assert_eq!(queue.len().await.unwrap(), 0);
        assert!(service.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_marks_unqueued_job_failed() {
        let jobs = JobRepository::new(Arc::new(MemoryJobStore::default()));
        let service = JobService::new(jobs, Arc::new(BrokenQueue));

        let err = service.submit("abc123").await.unwrap_err();
        assert!(matches!(err, ApiError::Queue(_)));

        let jobs = service.list().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert!(jobs[0]
            .error
            .as_deref()
            .unwrap()
            .starts_with("failed to queue job: "));
    }

    #[tokio::test]
    async fn test_status_unknown_job() {
        let (service, _) = service();
        let err = service.status(&JobId::new()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let (service, _) = service();
        let first = service.submit("a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = service.submit("b").await.unwrap();

        let jobs = service.list().await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, second.id);
        assert_eq!(jobs[1].id, first.id);
    }

    #[tokio::test]
    async fn test_cancel_pending_job() {
        let (service, _) = service();
        let job = service.submit("abc123").await.unwrap();

        let cancelled = service.cancel(&job.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert!(cancelled.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_cancel_terminal_job_is_rejected() {
        let (service, _) = service();
        let job = service.submit("abc123").await.unwrap();
        service.cancel(&job.id).await.unwrap();

        let err = service.cancel(&job.id).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)));
        assert_eq!(err.to_string(), "job already cancelled");
    }

    #[tokio::test]
    async fn test_cancel_unknown_job() {
        let (service, _) = service();
        let err = service.cancel(&JobId::new()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
