//! Structured job lifecycle logging.

use std::fmt::Display;

use tracing::{error, info, info_span, warn, Span};

use framex_models::{JobId, JobStatus};

/// Lifecycle logger for one job run. Every line carries `job_id` and
/// `operation` so a run can be followed in aggregated logs.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    operation: &'static str,
}

impl JobLogger {
    pub fn new(job_id: &JobId, operation: &'static str) -> Self {
        Self {
            job_id: job_id.clone(),
            operation,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Span covering the whole run.
    pub fn span(&self) -> Span {
        info_span!("job", job_id = %self.job_id, operation = self.operation)
    }

    /// The run ended before taking ownership of the job.
    pub fn skipped(&self, reason: impl Display) {
        warn!(job_id = %self.job_id, operation = self.operation, "Job skipped: {}", reason);
    }

    pub fn started(&self, file_id: &str) {
        info!(job_id = %self.job_id, operation = self.operation, file_id, "Job started");
    }

    /// A checkpoint was reached.
    pub fn stage(&self, progress: u8, detail: impl Display) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            progress,
            "{}", detail
        );
    }

    pub fn cancelled(&self, detail: &str) {
        info!(job_id = %self.job_id, operation = self.operation, "Job cancelled: {}", detail);
    }

    /// Another writer moved the job to a terminal status first.
    pub fn superseded(&self, status: JobStatus) {
        warn!(job_id = %self.job_id, operation = self.operation, %status, "Job ended by another writer");
    }

    pub fn failed(&self, error: &str) {
        error!(job_id = %self.job_id, operation = self.operation, error, "Job failed");
    }

    pub fn completed(&self, frame_count: u32, output_name: &str) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            frame_count,
            output_name,
            "Job completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_keeps_job_identity() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, "frame_extraction");

        assert_eq!(logger.job_id(), &job_id);
        assert_eq!(logger.operation(), "frame_extraction");
    }
}
