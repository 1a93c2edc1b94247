//! Multipart completion.
//!
//! Verifies ownership, validates the part list, finalizes the object, and
//! publishes exactly one processing message routed by file size. The store
//! completion is not auto-retried server-side: a transient failure is
//! surfaced as retryable and the client retries the completion call, which
//! is idempotent end to end (the job ID deduplicates the queue message).

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::common::errors::ApiError;
use crate::domains::jobs::models::JobStatus;
use crate::domains::processing::messages::ProcessingMessage;
use crate::domains::processing::router::QueueTier;
use crate::kernel::deps::ServerDeps;
use crate::kernel::traits::UploadPart;

/// Finalize a multipart upload and hand the job to the queue router.
pub async fn complete_multipart(
    deps: &Arc<ServerDeps>,
    user_id: Uuid,
    is_admin: bool,
    job_id: Uuid,
    upload_id: &str,
    mut parts: Vec<UploadPart>,
) -> Result<QueueTier, ApiError> {
    // Malformed part lists are rejected before any store mutation.
    if parts.is_empty() {
        return Err(ApiError::Validation("parts must not be empty".into()));
    }
    for part in &parts {
        if part.part_number <= 0 {
            return Err(ApiError::Validation(format!(
                "PartNumber {} is not positive",
                part.part_number
            )));
        }
        if part.etag.trim().is_empty() {
            return Err(ApiError::Validation(format!(
                "part {} has an empty ETag",
                part.part_number
            )));
        }
    }
    parts.sort_by_key(|p| p.part_number);
    if parts.windows(2).any(|w| w[0].part_number == w[1].part_number) {
        return Err(ApiError::Validation("duplicate PartNumber".into()));
    }

    let job = deps
        .job_store
        .get(job_id)
        .await?
        .ok_or(ApiError::NotFound("job"))?;
    if job.is_expired(chrono::Utc::now()) {
        return Err(ApiError::NotFound("job"));
    }

    // Ownership before anything touches the object store.
    if job.user_id != user_id && !is_admin {
        return Err(ApiError::Forbidden);
    }

    if job.upload_id.as_deref() != Some(upload_id) {
        return Err(ApiError::Validation("uploadId does not match job".into()));
    }

    match job.status {
        JobStatus::Uploading => {}
        // A retried completion call after the first one succeeded: the
        // dedupe key below makes re-dispatch a no-op.
        JobStatus::Processing | JobStatus::Streaming => {}
        other => {
            return Err(ApiError::Conflict(format!(
                "upload cannot be completed while job is {other}"
            )));
        }
    }

    let key = job
        .storage_key
        .clone()
        .ok_or_else(|| ApiError::Validation("job has no storage key".into()))?;

    let mut job = job;
    if job.status == JobStatus::Uploading {
        deps.object_store
            .complete_multipart(&deps.upload_bucket, &key, upload_id, &parts)
            .await
            .map_err(|e| ApiError::Retryable(format!("object finalization failed: {e}")))?;

        job.transition_to(JobStatus::Processing, deps.job_retention)
            .expect("uploading -> processing");
        deps.job_store.update(&job).await?;
    }

    let message = ProcessingMessage::for_job(&job, &deps.upload_bucket, &key);
    let tier = deps
        .queues
        .dispatch(&message, deps.large_file_threshold)
        .await?;

    info!(
        job_id = %job.id,
        tier = ?tier,
        parts = parts.len(),
        "multipart upload completed"
    );

    Ok(tier)
}
