//! Store error types.

use framex_models::{JobId, TransitionError};
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job already exists: {0}")]
    AlreadyExists(String),

    #[error("Version conflict for job {job_id}: expected version {expected}")]
    VersionConflict { job_id: String, expected: u64 },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn not_found(id: &JobId) -> Self {
        Self::NotFound(id.to_string())
    }

    pub fn already_exists(id: &JobId) -> Self {
        Self::AlreadyExists(id.to_string())
    }

    pub fn version_conflict(id: &JobId, expected: u64) -> Self {
        Self::VersionConflict {
            job_id: id.to_string(),
            expected,
        }
    }

    /// Whether the lifecycle state machine rejected the write.
    pub fn is_transition(&self) -> bool {
        matches!(self, StoreError::Transition(_))
    }
}
