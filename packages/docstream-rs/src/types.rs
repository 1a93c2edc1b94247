//! Wire types for the job status API.
//!
//! These mirror the server's JSON contract. The status field is a closed
//! enum so terminal-state handling in the poll loop is exhaustive.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle phase of a job as reported by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Pending,
    Uploading,
    Processing,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl JobPhase {
    /// True for states the job can never leave.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobPhase::Completed | JobPhase::Failed | JobPhase::Cancelled
        )
    }
}

/// Typed result payload of a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseData {
    /// Extracted text content.
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<UsageMetadata>,
    },
    /// A generated image reference plus the parameters that produced it.
    Image {
        image_key: String,
        generation_params: serde_json::Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<UsageMetadata>,
    },
}

/// Processing telemetry attached to a result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_chars: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_ms: Option<u64>,
}

/// One response from the job status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub job_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub status: JobPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_data: Option<ResponseData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Server-recommended delay before the next poll, in milliseconds.
    pub polling_interval: u64,
    pub should_continue_polling: bool,
    pub request_id: String,
}

/// Response from job submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// An incremental update yielded by the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    /// A partial-content snapshot, surfaced as soon as it is observed.
    Partial(String),
    /// The final result. Emitted exactly once, then the stream ends.
    Completed(ResponseData),
}
