//! Work queue on a Redis list (LPUSH / BRPOP).

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::debug;

use framex_models::JobId;

use crate::error::{QueueError, QueueResult};
use crate::queue::{QueueConfig, WorkQueue};

/// Slack added to the connection response timeout on top of the BRPOP block.
const RESPONSE_SLACK: Duration = Duration::from_secs(5);

/// Redis list backed work queue.
pub struct RedisWorkQueue {
    client: redis::Client,
    config: QueueConfig,
    /// Dedicated connection for BRPOP, tagged with the block length its
    /// response timeout was sized for.
    blocking: Mutex<Option<(u64, MultiplexedConnection)>>,
}

/// Whole seconds a BRPOP blocks for. Rounded up and never 0, which Redis
/// reads as "block forever"; whole seconds work on every Redis version.
fn block_secs(timeout: Duration) -> u64 {
    let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
    secs.max(1)
}

impl RedisWorkQueue {
    /// Create a new queue client.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            config,
            blocking: Mutex::new(None),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn connection(&self) -> QueueResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    async fn blocking_connection(&self, block: Duration) -> QueueResult<MultiplexedConnection> {
        let config =
            redis::AsyncConnectionConfig::new().set_response_timeout(block + RESPONSE_SLACK);
        self.client
            .get_multiplexed_async_connection_with_config(&config)
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }
}

#[async_trait]
impl WorkQueue for RedisWorkQueue {
    async fn enqueue(&self, job_id: &JobId) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        conn.lpush::<_, _, ()>(&self.config.queue_name, job_id.as_str())
            .await
            .map_err(|e| QueueError::enqueue_failed(e.to_string()))?;
        debug!(job_id = %job_id, queue = %self.config.queue_name, "Enqueued job");
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> QueueResult<Option<JobId>> {
        let secs = block_secs(timeout);
        // Held across the pop: one BRPOP at a time on the shared connection.
        let mut slot = self.blocking.lock().await;
        let mut conn = match slot.as_ref() {
            Some((sized_for, conn)) if *sized_for == secs => conn.clone(),
            _ => {
                let conn = self.blocking_connection(Duration::from_secs(secs)).await?;
                *slot = Some((secs, conn.clone()));
                conn
            }
        };

        let popped: Option<(String, String)> = match redis::cmd("BRPOP")
            .arg(&self.config.queue_name)
            .arg(secs)
            .query_async(&mut conn)
            .await
        {
            Ok(popped) => popped,
            Err(e) => {
                *slot = None;
                return Err(QueueError::dequeue_failed(e.to_string()));
            }
        };

        match popped {
            Some((_, entry)) if entry.trim().is_empty() => Err(QueueError::Malformed(entry)),
            Some((_, entry)) => Ok(Some(JobId::from_string(entry))),
            None => Ok(None),
        }
    }

    async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        Ok(conn.llen(&self.config.queue_name).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_queue() -> RedisWorkQueue {
        RedisWorkQueue::new(QueueConfig {
            queue_name: format!("test-queue:{}", JobId::new()),
            block_timeout: Duration::from_secs(1),
            ..QueueConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_default_queue_name() {
        let queue = RedisWorkQueue::new(QueueConfig::default()).unwrap();
        assert_eq!(queue.config().queue_name, "processing_queue");
    }

    #[test]
    fn test_block_secs_rounds_up_to_whole_seconds() {
        assert_eq!(block_secs(Duration::ZERO), 1);
        assert_eq!(block_secs(Duration::from_millis(50)), 1);
        assert_eq!(block_secs(Duration::from_secs(5)), 5);
        assert_eq!(block_secs(Duration::from_millis(5_200)), 6);
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_fifo_order() {
        let queue = test_queue();
        let first = JobId::from_string("first");
        let second = JobId::from_string("second");

        queue.enqueue(&first).await.unwrap();
        queue.enqueue(&second).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 2);

        let timeout = Duration::from_secs(1);
        assert_eq!(queue.dequeue(timeout).await.unwrap(), Some(first));
        assert_eq!(queue.dequeue(timeout).await.unwrap(), Some(second));
        assert_eq!(queue.dequeue(timeout).await.unwrap(), None);
    }
}
