//! Shared data models for the framex job pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Job records and their lifecycle state machine
//! - Progress checkpoints
//! - Completion/failure events sent to the notification sink

pub mod event;
pub mod job;
pub mod job_status;

// Re-export common types
pub use event::JobEvent;
pub use job::{
    Job, JobId, TransitionError, PROGRESS_COMPLETE, PROGRESS_EXTRACTING, PROGRESS_FRAMES_LISTED,
    PROGRESS_STARTED,
};
pub use job_status::JobStatus;
