//! Upload coordination endpoints.
//!
//! POST /api/uploads           - initiate a multipart upload
//! POST /api/uploads/complete  - finalize parts and enqueue processing

use axum::{extract::Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::errors::ApiError;
use crate::domains::jobs::models::ProcessingOptions;
use crate::domains::uploads::actions::{complete_multipart, initiate_upload, InitiateUpload};
use crate::kernel::traits::UploadPart;
use crate::server::app::AppState;
use crate::server::middleware::AuthUser;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateUploadRequest {
    pub file_name: String,
    pub file_size: i64,
    pub file_type: String,
    #[serde(default)]
    pub processing_options: Option<ProcessingOptions>,
    #[serde(default)]
    pub notify_email: Option<String>,
    #[serde(default)]
    pub part_count: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateUploadResponse {
    pub job_id: Uuid,
    pub upload_id: String,
    pub part_urls: Vec<String>,
    pub request_id: String,
}

pub async fn initiate_upload_handler(
    Extension(state): Extension<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(request): Json<InitiateUploadRequest>,
) -> Result<Json<InitiateUploadResponse>, ApiError> {
    let initiated = initiate_upload(
        &state.deps,
        auth.user_id,
        InitiateUpload {
            file_name: request.file_name,
            file_size: request.file_size,
            file_type: request.file_type,
            processing_options: request.processing_options.unwrap_or_default(),
            notify_email: request.notify_email,
            part_count: request.part_count,
        },
    )
    .await?;

    Ok(Json(InitiateUploadResponse {
        job_id: initiated.job_id,
        upload_id: initiated.upload_id,
        part_urls: initiated.part_urls,
        request_id: Uuid::new_v4().to_string(),
    }))
}

/// One part in the completion request. Field names follow the store's
/// multipart convention.
#[derive(Debug, Deserialize)]
pub struct PartInput {
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "PartNumber")]
    pub part_number: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadRequest {
    pub upload_id: String,
    pub job_id: Uuid,
    pub parts: Vec<PartInput>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadResponse {
    pub job_id: Uuid,
    pub status: String,
    pub request_id: String,
}

pub async fn complete_upload_handler(
    Extension(state): Extension<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(request): Json<CompleteUploadRequest>,
) -> Result<Json<CompleteUploadResponse>, ApiError> {
    let parts = request
        .parts
        .into_iter()
        .map(|p| UploadPart {
            part_number: p.part_number,
            etag: p.etag,
        })
        .collect();

    complete_multipart(
        &state.deps,
        auth.user_id,
        auth.is_admin,
        request.job_id,
        &request.upload_id,
        parts,
    )
    .await?;

    Ok(Json(CompleteUploadResponse {
        job_id: request.job_id,
        status: "processing".to_string(),
        request_id: Uuid::new_v4().to_string(),
    }))
}
