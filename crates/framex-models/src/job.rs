//! Job record and lifecycle mutators.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::JobStatus;

/// Progress written when the worker takes ownership.
pub const PROGRESS_STARTED: u8 = 0;
/// Progress written right before the extraction tool runs.
pub const PROGRESS_EXTRACTING: u8 = 10;
/// Progress written once the frame artifacts are enumerated.
pub const PROGRESS_FRAMES_LISTED: u8 = 70;
/// Progress of a completed job. Only `Job::complete` writes it.
pub const PROGRESS_COMPLETE: u8 = 100;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the archive produced for this job.
    pub fn output_name(&self) -> String {
        format!("frames_{}.zip", self.0)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Rejected lifecycle mutation. The job is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Invalid transition from {from} to {to}")]
    Invalid { from: JobStatus, to: JobStatus },

    #[error("Job is {0}, expected processing")]
    NotProcessing(JobStatus),

    #[error("Job lease is still active")]
    LeaseActive,
}

impl TransitionError {
    /// Status the job was in when the mutation was rejected.
    pub fn current(&self) -> JobStatus {
        match self {
            TransitionError::Invalid { from, .. } => *from,
            TransitionError::NotProcessing(status) => *status,
            TransitionError::LeaseActive => JobStatus::Processing,
        }
    }
}

/// A frame-extraction job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Upload store reference of the input artifact
    pub file_id: String,

    /// Lifecycle status
    pub status: JobStatus,

    /// Progress (0-100)
    #[serde(default)]
    pub progress: u8,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last write timestamp
    pub updated_at: DateTime<Utc>,

    /// Set once, on entering processing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Set once, on entering a terminal state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Archive name in the output store (completed only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,

    /// Number of extracted frames (completed only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<u32>,

    /// Failure cause (failed only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Worker liveness lease (processing only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_at: Option<DateTime<Utc>>,

    /// Write counter for compare-and-set
    #[serde(default)]
    pub version: u64,
}

impl Job {
    /// Create a new pending job for an uploaded file.
    pub fn new(file_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            file_id: file_id.into(),
            status: JobStatus::Pending,
            progress: PROGRESS_STARTED,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            output_name: None,
            frame_count: None,
            error: None,
            heartbeat_at: None,
            version: 0,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::Invalid {
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.completed_at = Some(now);
            self.heartbeat_at = None;
        }
        Ok(())
    }

    fn ensure_processing(&self) -> Result<(), TransitionError> {
        if self.status != JobStatus::Processing {
            return Err(TransitionError::NotProcessing(self.status));
        }
        Ok(())
    }

    /// Take ownership: pending -> processing.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Processing)?;
        self.progress = PROGRESS_STARTED;
        self.started_at = Some(self.updated_at);
        self.heartbeat_at = Some(self.updated_at);
        Ok(())
    }

    /// Record a checkpoint. Never lowers progress and never reaches 100.
    pub fn record_progress(&mut self, progress: u8) -> Result<(), TransitionError> {
        self.ensure_processing()?;
        self.progress = self.progress.max(progress.min(PROGRESS_COMPLETE - 1));
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Refresh the liveness lease.
    pub fn heartbeat(&mut self) -> Result<(), TransitionError> {
        self.ensure_processing()?;
        let now = Utc::now();
        self.heartbeat_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// processing -> completed.
    pub fn complete(
        &mut self,
        output_name: impl Into<String>,
        frame_count: u32,
    ) -> Result<(), TransitionError> {
        self.transition(JobStatus::Completed)?;
        self.progress = PROGRESS_COMPLETE;
        self.output_name = Some(output_name.into());
        self.frame_count = Some(frame_count);
        Ok(())
    }

    /// pending | processing -> failed.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// processing -> failed, only if the lease is still stale.
    pub fn fail_stale(
        &mut self,
        threshold: Duration,
        now: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Result<(), TransitionError> {
        self.ensure_processing()?;
        if !self.is_stale(threshold, now) {
            return Err(TransitionError::LeaseActive);
        }
        self.fail(error)
    }

    /// pending | processing -> cancelled.
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Cancelled)
    }

    /// Whether a processing job has stopped refreshing its lease.
    ///
    /// Jobs that never recorded a heartbeat are judged by `started_at`.
    pub fn is_stale(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        if self.status != JobStatus::Processing {
            return false;
        }
        match self.heartbeat_at.or(self.started_at) {
            Some(last_seen) => now - last_seen > threshold,
            None => now - self.updated_at > threshold,
        }
    }
}
