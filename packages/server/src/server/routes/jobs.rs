//! Job status, history, and cancellation endpoints.
//!
//! GET  /api/jobs            - the caller's job history, newest first
//! GET  /api/jobs/:id        - status poll (server-paced)
//! POST /api/jobs/:id/cancel - cooperative cancellation

use axum::{
    extract::{Extension, Path},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::common::errors::ApiError;
use crate::domains::jobs::models::{Job, JobStatus, ResponseData};
use crate::server::app::AppState;
use crate::server::middleware::AuthUser;

/// Server-recommended delay before the caller's next poll.
///
/// Slow-start: early polls are cheap and frequent, long-running jobs are
/// polled progressively more slowly. Because the client honors whatever
/// value we return, this schedule can change server-side without client
/// updates.
pub fn recommended_interval_ms(poll_attempts: i32) -> u64 {
    match poll_attempts {
        i32::MIN..=9 => 1_000,
        10..=29 => 2_000,
        30..=99 => 5_000,
        _ => 10_000,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_data: Option<ResponseData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub polling_interval: u64,
    pub should_continue_polling: bool,
    pub request_id: String,
}

fn authorize(job: &Job, auth: &AuthUser) -> Result<(), ApiError> {
    if job.user_id != auth.user_id && !auth.is_admin {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

pub async fn job_status_handler(
    Extension(state): Extension<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job = state
        .deps
        .job_store
        .get(job_id)
        .await?
        .ok_or(ApiError::NotFound("job"))?;

    // Records past their retention window are gone as far as clients are
    // concerned, even if the purge sweep has not reached them yet.
    if job.is_expired(Utc::now()) {
        return Err(ApiError::NotFound("job"));
    }

    authorize(&job, &auth)?;

    let attempts = state.deps.job_store.record_poll(job_id).await?;
    let terminal = job.status.is_terminal();

    Ok(Json(JobStatusResponse {
        job_id: job.id,
        status: job.status,
        partial_content: job.partial_content,
        response_data: job.response_data,
        error_message: job.error_message,
        polling_interval: recommended_interval_ms(attempts),
        should_continue_polling: !terminal,
        request_id: Uuid::new_v4().to_string(),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: Uuid,
    pub file_name: String,
    pub file_size: i64,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListResponse {
    pub jobs: Vec<JobSummary>,
}

pub async fn list_jobs_handler(
    Extension(state): Extension<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<JobListResponse>, ApiError> {
    let now = Utc::now();
    let jobs = state
        .deps
        .job_store
        .list_for_user(auth.user_id)
        .await?
        .into_iter()
        .filter(|job| !job.is_expired(now))
        .map(|job| JobSummary {
            job_id: job.id,
            file_name: job.file_name,
            file_size: job.file_size,
            status: job.status,
            created_at: job.created_at,
        })
        .collect();

    Ok(Json(JobListResponse { jobs }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelJobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    /// False when the job had already reached a terminal state.
    pub cancelled: bool,
}

pub async fn cancel_job_handler(
    Extension(state): Extension<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<CancelJobResponse>, ApiError> {
    let mut job = state
        .deps
        .job_store
        .get(job_id)
        .await?
        .ok_or(ApiError::NotFound("job"))?;

    authorize(&job, &auth)?;

    // Cancellation is cooperative and idempotent: a terminal job is left
    // as-is, an in-flight worker observes the status change and stops.
    if job.status.is_terminal() {
        return Ok(Json(CancelJobResponse {
            job_id: job.id,
            status: job.status,
            cancelled: false,
        }));
    }

    job.cancel(state.deps.job_retention)
        .map_err(|e| ApiError::Conflict(e.to_string()))?;
    state.deps.job_store.update(&job).await?;

    tracing::info!(job_id = %job.id, user_id = %auth.user_id, "job cancelled");

    Ok(Json(CancelJobResponse {
        job_id: job.id,
        status: job.status,
        cancelled: true,
    }))
}
