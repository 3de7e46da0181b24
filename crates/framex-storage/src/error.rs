//! Storage errors and object name checks.

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage misconfigured: {0}")]
    ConfigError(String),

    /// No upload or object with this name.
    #[error("{0} not found")]
    NotFound(String),

    #[error("could not write output: {0}")]
    UploadFailed(String),

    /// The name is empty or could escape the store root.
    #[error("illegal object name {0:?}")]
    InvalidKey(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn config_error(reason: impl Into<String>) -> Self {
        StorageError::ConfigError(reason.into())
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        StorageError::NotFound(name.into())
    }

    pub fn upload_failed(reason: impl Into<String>) -> Self {
        StorageError::UploadFailed(reason.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Names are single path components: no separators, no `..`, no NUL.
pub(crate) fn validate_name(name: &str) -> StorageResult<()> {
    let illegal = name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains(['/', '\\', '\0']);
    if illegal {
        Err(StorageError::InvalidKey(name.to_string()))
    } else {
        Ok(())
    }
}
