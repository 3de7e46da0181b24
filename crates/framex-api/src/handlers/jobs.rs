//! Job submission, polling and cancellation endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use framex_models::{Job, JobId, JobStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// POST /process body.
#[derive(Debug, Deserialize, Validate)]
pub struct ProcessRequest {
    #[validate(length(min = 1, max = 256, message = "file_id must be 1-256 characters"))]
    pub file_id: String,
}

/// Response to an accepted submission.
#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub job_id: JobId,
    pub file_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<Job>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub message: String,
}

/// POST /process
///
/// Creates a pending job and queues it.
///
/// Returns:
/// - 200: Job accepted
/// - 400: Missing, malformed or blank `file_id`
pub async fn submit_job(
    State(state): State<AppState>,
    body: Result<Json<ProcessRequest>, JsonRejection>,
) -> ApiResult<Json<ProcessResponse>> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let job = state.jobs.submit(&request.file_id).await?;

    Ok(Json(ProcessResponse {
        job_id: job.id,
        file_id: job.file_id,
        status: job.status,
        created_at: job.created_at,
    }))
}

/// GET /process/:id/status
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Job>> {
    let job_id = parse_job_id(&job_id)?;
    Ok(Json(state.jobs.status(&job_id).await?))
}

/// GET /jobs
pub async fn list_jobs(State(state): State<AppState>) -> ApiResult<Json<JobListResponse>> {
    let jobs = state.jobs.list().await?;
    let total = jobs.len();
    Ok(Json(JobListResponse { jobs, total }))
}

/// DELETE /process/:id
///
/// Returns:
/// - 200: Job cancelled
/// - 400: Job already completed, failed or cancelled
/// - 404: Job not found
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<CancelResponse>> {
    let job_id = parse_job_id(&job_id)?;
    let job = state.jobs.cancel(&job_id).await?;
    Ok(Json(CancelResponse {
        job_id: job.id,
        status: job.status,
        message: "Job cancelled successfully".to_string(),
    }))
}

/// Malformed ids cannot name a job, so they answer 404 without a store read.
fn parse_job_id(id: &str) -> ApiResult<JobId> {
    if is_valid_job_id(id) {
        Ok(JobId::from(id))
    } else {
        Err(ApiError::not_found(format!("job {} not found", id)))
    }
}

/// Alphanumeric characters and hyphens only, 8-64 chars.
fn is_valid_job_id(id: &str) -> bool {
    (8..=64).contains(&id.len()) && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_job_ids() {
        assert!(is_valid_job_id("550e8400-e29b-41d4-a716-446655440000"));
        assert!(is_valid_job_id("abc12345"));
    }

    #[test]
    fn test_invalid_job_ids() {
        assert!(!is_valid_job_id(""));
        assert!(!is_valid_job_id("short"));
        assert!(!is_valid_job_id("has space!"));
        assert!(!is_valid_job_id("../../etc/passwd"));
        assert!(!is_valid_job_id(&"a".repeat(65)));
    }
}
