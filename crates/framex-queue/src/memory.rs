//! In-process work queue.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use framex_models::JobId;

use crate::error::QueueResult;
use crate::queue::WorkQueue;

/// Work queue held in memory.
#[derive(Default)]
pub struct MemoryWorkQueue {
    items: Mutex<VecDeque<JobId>>,
    notify: Notify,
}

impl MemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn enqueue(&self, job_id: &JobId) -> QueueResult<()> {
        self.items.lock().await.push_back(job_id.clone());
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> QueueResult<Option<JobId>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(job_id) = self.items.lock().await.pop_front() {
                return Ok(Some(job_id));
            }
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return Ok(self.items.lock().await.pop_front());
            }
        }
    }

    async fn len(&self) -> QueueResult<u64> {
        Ok(self.items.lock().await.len() as u64)
    }
}
