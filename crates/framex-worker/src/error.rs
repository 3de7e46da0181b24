//! Worker error types.

use thiserror::Error;

use framex_media::MediaError;
use framex_queue::QueueError;
use framex_storage::StorageError;
use framex_store::StoreError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("input file not found for file ID: {0}")]
    InputNotFound(String),

    #[error("job cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Notification failed: {0}")]
    NotificationFailed(String),

    #[error(transparent)]
    Media(MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MediaError> for WorkerError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Cancelled => WorkerError::Cancelled,
            other => WorkerError::Media(other),
        }
    }
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn notification_failed(msg: impl Into<String>) -> Self {
        Self::NotificationFailed(msg.into())
    }

    /// Check if error is retryable. Only failures of the external tool
    /// are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkerError::Media(e) if e.is_tool_failure())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkerError::Cancelled)
    }
}
