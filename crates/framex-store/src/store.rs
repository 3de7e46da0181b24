//! Job record store contract.

use std::time::Duration;

use async_trait::async_trait;
use framex_models::{Job, JobId};

use crate::error::StoreResult;

/// Default retention of a job record after its last write (24 hours).
pub const DEFAULT_RETENTION_SECS: u64 = 24 * 60 * 60;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Redis URL
    pub redis_url: String,
    /// Key prefix for job records
    pub key_prefix: String,
    /// Retention TTL, refreshed on every write
    pub retention: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "job:".to_string(),
            retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            key_prefix: std::env::var("JOB_KEY_PREFIX").unwrap_or_else(|_| "job:".to_string()),
            retention: Duration::from_secs(
                std::env::var("JOB_RETENTION_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_RETENTION_SECS),
            ),
        }
    }
}

/// Keyed storage for job records.
///
/// Every write carries the retention TTL. Records may disappear once it
/// elapses; readers treat a missing record as "not found".
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a record. Fails with `AlreadyExists` if the id is taken.
    async fn insert(&self, job: &Job) -> StoreResult<()>;

    /// Unconditional write.
    async fn put(&self, job: &Job) -> StoreResult<()>;

    /// Read a record.
    async fn get(&self, id: &JobId) -> StoreResult<Option<Job>>;

    /// Read every live record.
    async fn list(&self) -> StoreResult<Vec<Job>>;

    /// Write only if the stored record still has `expected_version`.
    ///
    /// Fails with `VersionConflict` on mismatch and `NotFound` if the
    /// record expired in the meantime.
    async fn compare_and_put(&self, job: &Job, expected_version: u64) -> StoreResult<()>;

    /// Connectivity check.
    async fn ping(&self) -> StoreResult<()>;
}
