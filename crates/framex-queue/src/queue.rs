//! Work queue contract and configuration.

use std::time::Duration;

use async_trait::async_trait;
use framex_models::JobId;

use crate::error::QueueResult;

const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
const DEFAULT_QUEUE_KEY: &str = "processing_queue";

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub redis_url: String,
    /// Redis list holding pending job ids.
    pub queue_name: String,
    /// Upper bound of one blocking pop.
    pub block_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.into(),
            queue_name: DEFAULT_QUEUE_KEY.into(),
            block_timeout: Duration::from_secs(5),
        }
    }
}

impl QueueConfig {
    /// Reads `REDIS_URL`, `QUEUE_KEY` and `QUEUE_BLOCK_SECS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("REDIS_URL") {
            config.redis_url = url;
        }
        if let Ok(key) = std::env::var("QUEUE_KEY") {
            config.queue_name = key;
        }
        if let Some(secs) = std::env::var("QUEUE_BLOCK_SECS")
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
        {
            config.block_timeout = Duration::from_secs(secs);
        }
        config
    }
}

/// FIFO queue of job ids.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Append a job id.
    async fn enqueue(&self, job_id: &JobId) -> QueueResult<()>;

    /// Pop the oldest job id, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    async fn dequeue(&self, timeout: Duration) -> QueueResult<Option<JobId>>;

    /// Number of queued ids.
    async fn len(&self) -> QueueResult<u64>;
}
