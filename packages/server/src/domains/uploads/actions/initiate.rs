//! Upload initiation.
//!
//! Creates the job record and opens a multipart upload session against the
//! object store. The job is born `pending` and moves to `uploading` once
//! the session exists; the client then uploads parts directly to the
//! pre-authorized URLs.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::common::errors::ApiError;
use crate::common::sanitize::sanitize_file_name;
use crate::domains::jobs::models::{Job, JobStatus, ProcessingOptions};
use crate::kernel::deps::ServerDeps;

/// Largest accepted upload: 5 GB.
const MAX_FILE_SIZE: i64 = 5 * 1024 * 1024 * 1024;

/// Part size used to compute the default part count: 8 MB.
const PART_SIZE: i64 = 8 * 1024 * 1024;

/// Most parts a single upload may use.
const MAX_PARTS: u32 = 10_000;

/// Validated initiation request.
#[derive(Debug, Clone)]
pub struct InitiateUpload {
    pub file_name: String,
    pub file_size: i64,
    pub file_type: String,
    pub processing_options: ProcessingOptions,
    pub notify_email: Option<String>,
    /// Client-requested part count; computed from size when absent.
    pub part_count: Option<u32>,
}

/// Result of a successful initiation.
#[derive(Debug, Clone)]
pub struct InitiatedUpload {
    pub job_id: Uuid,
    pub upload_id: String,
    pub part_urls: Vec<String>,
}

/// Create a `pending` job and begin its multipart upload.
pub async fn initiate_upload(
    deps: &Arc<ServerDeps>,
    user_id: Uuid,
    request: InitiateUpload,
) -> Result<InitiatedUpload, ApiError> {
    // Validation happens before any store mutation.
    if request.file_name.trim().is_empty() {
        return Err(ApiError::Validation("fileName must not be empty".into()));
    }
    if request.file_size <= 0 {
        return Err(ApiError::Validation("fileSize must be positive".into()));
    }
    if request.file_size > MAX_FILE_SIZE {
        return Err(ApiError::Validation(format!(
            "fileSize exceeds the {MAX_FILE_SIZE} byte limit"
        )));
    }
    if request.file_type.trim().is_empty() {
        return Err(ApiError::Validation("fileType must not be empty".into()));
    }
    if let Some(email) = &request.notify_email {
        if !email.contains('@') {
            return Err(ApiError::Validation("notifyEmail is not an address".into()));
        }
    }

    let part_count = match request.part_count {
        Some(0) => return Err(ApiError::Validation("partCount must be positive".into())),
        Some(n) if n > MAX_PARTS => {
            return Err(ApiError::Validation(format!(
                "partCount exceeds the {MAX_PARTS} part limit"
            )))
        }
        Some(n) => n,
        None => (((request.file_size + PART_SIZE - 1) / PART_SIZE) as u32).clamp(1, MAX_PARTS),
    };

    let mut job = Job::builder()
        .user_id(user_id)
        .file_name(request.file_name.clone())
        .file_size(request.file_size)
        .file_type(request.file_type.clone())
        .processing_options(request.processing_options.clone())
        .ttl(Job::ttl_from_now(deps.job_retention))
        .build();
    job.notify_email = request.notify_email.clone();

    let sanitized = sanitize_file_name(&request.file_name);
    let key = format!("uploads/{}/{}/{}", user_id, job.id, sanitized);

    deps.job_store.insert(&job).await?;

    let init = deps
        .object_store
        .initiate_multipart(&deps.upload_bucket, &key, part_count)
        .await
        .map_err(|e| ApiError::Retryable(format!("could not open upload session: {e}")))?;

    job.upload_id = Some(init.upload_id.clone());
    job.storage_key = Some(key);
    job.transition_to(JobStatus::Uploading, deps.job_retention)
        .expect("pending -> uploading");
    deps.job_store.update(&job).await?;

    info!(
        job_id = %job.id,
        user_id = %user_id,
        file_size = request.file_size,
        parts = init.part_urls.len(),
        "upload initiated"
    );

    Ok(InitiatedUpload {
        job_id: job.id,
        upload_id: init.upload_id,
        part_urls: init.part_urls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_dependencies::TestDependencies;

    fn request() -> InitiateUpload {
        InitiateUpload {
            file_name: "quarterly report.pdf".into(),
            file_size: 10 * 1024 * 1024,
            file_type: "application/pdf".into(),
            processing_options: ProcessingOptions::default(),
            notify_email: None,
            part_count: None,
        }
    }

    #[tokio::test]
    async fn test_initiate_creates_uploading_job() {
        let harness = TestDependencies::new();
        let user_id = Uuid::new_v4();

        let initiated = initiate_upload(&harness.deps, user_id, request())
            .await
            .unwrap();

        let job = harness
            .deps
            .job_store
            .get(initiated.job_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, JobStatus::Uploading);
        assert_eq!(job.user_id, user_id);
        assert_eq!(job.upload_id.as_deref(), Some(initiated.upload_id.as_str()));

        // 10 MB at 8 MB parts = 2 part URLs.
        assert_eq!(initiated.part_urls.len(), 2);

        // The storage key is sanitized, scoped to user and job.
        let key = job.storage_key.unwrap();
        assert!(key.contains("quarterly_report.pdf"));
        assert!(key.starts_with(&format!("uploads/{user_id}/")));
    }

    #[tokio::test]
    async fn test_invalid_sizes_rejected_before_any_mutation() {
        let harness = TestDependencies::new();
        let user_id = Uuid::new_v4();

        let mut bad = request();
        bad.file_size = 0;
        assert!(matches!(
            initiate_upload(&harness.deps, user_id, bad).await,
            Err(ApiError::Validation(_))
        ));

        let mut bad = request();
        bad.file_size = MAX_FILE_SIZE + 1;
        assert!(matches!(
            initiate_upload(&harness.deps, user_id, bad).await,
            Err(ApiError::Validation(_))
        ));

        assert!(harness
            .deps
            .job_store
            .list_for_user(user_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_bad_notify_email_rejected() {
        let harness = TestDependencies::new();
        let mut bad = request();
        bad.notify_email = Some("not-an-address".into());
        assert!(matches!(
            initiate_upload(&harness.deps, Uuid::new_v4(), bad).await,
            Err(ApiError::Validation(_))
        ));
    }
}
