//! Media errors.
//!
//! `FfmpegFailed`, `Timeout` and `NoFrames` render to the exact strings
//! stored in a failed job's `error` field.

use std::path::PathBuf;

use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

#[derive(Debug, Error)]
pub enum MediaError {
    /// ffmpeg ran and exited unsuccessfully. `message` is the useful tail
    /// of its stderr.
    #[error("ffmpeg error: {message}")]
    FfmpegFailed {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("ffmpeg error: timed out after {0} seconds")]
    Timeout(u64),

    #[error("no frames extracted from video")]
    NoFrames,

    #[error("ffmpeg binary is not on PATH")]
    FfmpegNotFound,

    #[error("{} does not exist", .0.display())]
    FileNotFound(PathBuf),

    /// Cancellation was observed while the tool was running.
    #[error("extraction cancelled")]
    Cancelled,

    #[error("writing archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl MediaError {
    pub fn ffmpeg_failed(message: impl Into<String>, exit_code: Option<i32>) -> Self {
        MediaError::FfmpegFailed {
            message: message.into(),
            exit_code,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        MediaError::Internal(message.into())
    }

    /// True when running the tool again could succeed.
    pub fn is_tool_failure(&self) -> bool {
        matches!(self, MediaError::FfmpegFailed { .. } | MediaError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_facing_messages() {
        let err = MediaError::ffmpeg_failed("Invalid data found when processing input", Some(1));
        assert_eq!(
            err.to_string(),
            "ffmpeg error: Invalid data found when processing input"
        );
        assert_eq!(
            MediaError::Timeout(300).to_string(),
            "ffmpeg error: timed out after 300 seconds"
        );
        assert_eq!(MediaError::NoFrames.to_string(), "no frames extracted from video");
    }

    #[test]
    fn test_only_tool_errors_are_retryable() {
        assert!(MediaError::ffmpeg_failed("boom", None).is_tool_failure());
        assert!(MediaError::Timeout(1).is_tool_failure());
        assert!(!MediaError::NoFrames.is_tool_failure());
        assert!(!MediaError::Cancelled.is_tool_failure());
        assert!(!MediaError::FfmpegNotFound.is_tool_failure());
    }
}
