//! Shared collaborators of every job run.

use std::sync::Arc;

use framex_media::{FfmpegFrameExtractor, FrameExtractor};
use framex_storage::{OutputStore, StorageConfig, UploadStore};
use framex_store::{JobRepository, RedisJobStore};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::notifier::{NotificationSink, NotifierConfig};

/// Everything a job run needs besides the job id.
pub struct ProcessingContext {
    pub config: WorkerConfig,
    pub jobs: JobRepository,
    pub uploads: Arc<dyn UploadStore>,
    pub outputs: Arc<dyn OutputStore>,
    pub extractor: Arc<dyn FrameExtractor>,
    pub notifier: Arc<dyn NotificationSink>,
}

impl ProcessingContext {
    pub fn new(
        config: WorkerConfig,
        jobs: JobRepository,
        uploads: Arc<dyn UploadStore>,
        outputs: Arc<dyn OutputStore>,
        extractor: Arc<dyn FrameExtractor>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            config,
            jobs,
            uploads,
            outputs,
            extractor,
            notifier,
        }
    }

    /// Production wiring: Redis store, configured upload/output stores,
    /// ffmpeg extraction and the configured notifier.
    pub fn from_env(config: WorkerConfig) -> WorkerResult<Self> {
        let store = RedisJobStore::from_env()?;
        let storage = StorageConfig::from_env()?;
        let extractor =
            FfmpegFrameExtractor::new(config.frame_rate.clone(), config.job_timeout.as_secs());
        let notifier = NotifierConfig::from_env().build()?;

        Ok(Self::new(
            config,
            JobRepository::new(Arc::new(store)),
            Arc::new(storage.upload_store()),
            storage.output_store()?,
            Arc::new(extractor),
            notifier,
        ))
    }
}
