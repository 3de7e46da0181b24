//! Job completion/failure event published to the notification sink.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{Job, JobId, JobStatus};

/// Outward event payload for a job that reached a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobEvent {
    pub job_id: JobId,
    pub file_id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobEvent {
    /// Short human title for the event.
    pub fn title(&self) -> String {
        match self.status {
            JobStatus::Completed => "Processing completed".to_string(),
            JobStatus::Failed => "Processing failed".to_string(),
            other => format!("Processing {}", other),
        }
    }

    /// Human readable summary of the outcome.
    pub fn message(&self) -> String {
        match (&self.status, self.frame_count, &self.error) {
            (JobStatus::Completed, Some(frames), _) => format!(
                "Job {} extracted {} frames from file {}",
                self.job_id, frames, self.file_id
            ),
            (JobStatus::Failed, _, Some(error)) => {
                format!("Job {} failed for file {}: {}", self.job_id, self.file_id, error)
            }
            _ => format!("Job {} is {}", self.job_id, self.status),
        }
    }
}

impl From<&Job> for JobEvent {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            file_id: job.file_id.clone(),
            status: job.status,
            output_name: job.output_name.clone(),
            frame_count: job.frame_count,
            error: job.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_event_payload() {
        let mut job = Job::new("abc123");
        job.start().unwrap();
        job.complete(job.id.output_name(), 3).unwrap();

        let event = JobEvent::from(&job);
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["job_id"], job.id.as_str());
        assert_eq!(value["status"], "completed");
        assert_eq!(value["frame_count"], 3);
        assert!(value.get("error").is_none());
        assert!(event.message().contains("3 frames"));
    }

    #[test]
    fn test_failed_event_payload() {
        let mut job = Job::new("missing");
        job.start().unwrap();
        job.fail("input file not found for file ID: missing").unwrap();

        let event = JobEvent::from(&job);
        assert_eq!(event.title(), "Processing failed");
        assert!(event.output_name.is_none());
        assert!(event.message().ends_with("input file not found for file ID: missing"));
    }
}
