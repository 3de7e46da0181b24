//! In-process job store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use framex_models::{Job, JobId};

use crate::error::{StoreError, StoreResult};
use crate::store::{JobStore, DEFAULT_RETENTION_SECS};

struct Entry {
    job: Job,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Job store held in memory, with the same retention semantics as the
/// Redis store. Expired records are dropped lazily on the next write.
pub struct MemoryJobStore {
    records: RwLock<HashMap<JobId, Entry>>,
    retention: Duration,
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_RETENTION_SECS))
    }
}

impl MemoryJobStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            retention,
        }
    }

    fn entry(&self, job: &Job) -> Entry {
        Entry {
            job: job.clone(),
            expires_at: Instant::now() + self.retention,
        }
    }

    fn purge_expired(records: &mut HashMap<JobId, Entry>, now: Instant) {
        records.retain(|_, entry| entry.is_live(now));
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &Job) -> StoreResult<()> {
        let mut records = self.records.write().await;
        Self::purge_expired(&mut records, Instant::now());
        if records.contains_key(&job.id) {
            return Err(StoreError::already_exists(&job.id));
        }
        records.insert(job.id.clone(), self.entry(job));
        Ok(())
    }

    async fn put(&self, job: &Job) -> StoreResult<()> {
        let mut records = self.records.write().await;
        Self::purge_expired(&mut records, Instant::now());
        records.insert(job.id.clone(), self.entry(job));
        Ok(())
    }

    async fn get(&self, id: &JobId) -> StoreResult<Option<Job>> {
        let now = Instant::now();
        let records = self.records.read().await;
        Ok(records
            .get(id)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.job.clone()))
    }

    async fn list(&self) -> StoreResult<Vec<Job>> {
        let now = Instant::now();
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.job.clone())
            .collect())
    }

    async fn compare_and_put(&self, job: &Job, expected_version: u64) -> StoreResult<()> {
        let mut records = self.records.write().await;
        Self::purge_expired(&mut records, Instant::now());
        let current = records
            .get(&job.id)
            .ok_or_else(|| StoreError::not_found(&job.id))?;
        if current.job.version != expected_version {
            return Err(StoreError::version_conflict(&job.id, expected_version));
        }
        records.insert(job.id.clone(), self.entry(job));
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_is_create_if_absent() {
        let store = MemoryJobStore::default();
        let job = Job::new("abc123");

        store.insert(&job).await.unwrap();
        let err = store.insert(&job).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_compare_and_put_checks_version() {
        let store = MemoryJobStore::default();
        let mut job = Job::new("abc123");
        store.insert(&job).await.unwrap();

        job.version = 1;
        store.compare_and_put(&job, 0).await.unwrap();

        let err = store.compare_and_put(&job, 0).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { expected: 0, .. }));
        assert_eq!(store.get(&job.id).await.unwrap().unwrap().version, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_expire_after_retention() {
        let store = MemoryJobStore::new(Duration::from_secs(10));
        let job = Job::new("abc123");
        store.insert(&job).await.unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(store.get(&job.id).await.unwrap().is_some());

        // A write refreshes the retention window.
        store.put(&job).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(store.get(&job.id).await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(store.get(&job.id).await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());

        let err = store.compare_and_put(&job, 0).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
