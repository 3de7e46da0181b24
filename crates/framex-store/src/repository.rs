//! Serialized read-modify-write access to job records.
//!
//! Writers in the same process queue on a per-job mutex. Writers in other
//! processes (the API and the worker share one store) are caught by the
//! version check on `compare_and_put`, and the update is re-applied to the
//! fresh record.

use std::sync::Arc;

use tracing::debug;

use framex_models::{Job, JobId, TransitionError};

use crate::error::{StoreError, StoreResult};
use crate::locks::KeyedLocks;
use crate::store::JobStore;

const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Job records with serialized, version-checked updates.
#[derive(Clone)]
pub struct JobRepository {
    store: Arc<dyn JobStore>,
    locks: Arc<KeyedLocks>,
    max_attempts: u32,
}

impl JobRepository {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            locks: Arc::new(KeyedLocks::new()),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Persist a new record.
    pub async fn create(&self, job: &Job) -> StoreResult<()> {
        self.store.insert(job).await
    }

    pub async fn get(&self, id: &JobId) -> StoreResult<Option<Job>> {
        self.store.get(id).await
    }

    /// Read a record that must exist.
    pub async fn require(&self, id: &JobId) -> StoreResult<Job> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| StoreError::not_found(id))
    }

    pub async fn list(&self) -> StoreResult<Vec<Job>> {
        self.store.list().await
    }

    pub async fn ping(&self) -> StoreResult<()> {
        self.store.ping().await
    }

    /// Apply `mutate` to the current record and write it back.
    ///
    /// If `mutate` returns an error nothing is written and the error is
    /// surfaced as `StoreError::Transition`. On a version conflict the
    /// record is re-read and `mutate` runs again.
    pub async fn update<F>(&self, id: &JobId, mut mutate: F) -> StoreResult<Job>
    where
        F: FnMut(&mut Job) -> Result<(), TransitionError> + Send,
    {
        let _guard = self.locks.lock(id.as_str()).await;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut job = self.require(id).await?;
            let expected = job.version;

            mutate(&mut job)?;
            job.version = expected + 1;

            match self.store.compare_and_put(&job, expected).await {
                Ok(()) => return Ok(job),
                Err(StoreError::VersionConflict { .. }) if attempt < self.max_attempts => {
                    debug!(job_id = %id, attempt, "Concurrent write detected, retrying update");
                }
                Err(e) => return Err(e),
            }
        }
    }
}
