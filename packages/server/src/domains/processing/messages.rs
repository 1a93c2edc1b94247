//! Queue message contracts.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domains::jobs::models::{Job, ProcessingOptions};

/// One processing message = one job. Published by the upload coordinator on
/// multipart completion, consumed by exactly one worker at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingMessage {
    pub job_id: Uuid,
    pub bucket: String,
    pub key: String,
    pub file_name: String,
    pub file_size: i64,
    pub file_type: String,
    pub user_id: Uuid,
    pub processing_options: ProcessingOptions,
}

impl ProcessingMessage {
    /// Build the message for a job whose upload has been finalized.
    pub fn for_job(job: &Job, bucket: &str, key: &str) -> Self {
        Self {
            job_id: job.id,
            bucket: bucket.to_string(),
            key: key.to_string(),
            file_name: job.file_name.clone(),
            file_size: job.file_size,
            file_type: job.file_type.clone(),
            user_id: job.user_id,
            processing_options: job.processing_options.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_is_camel_case() {
        let message = ProcessingMessage {
            job_id: Uuid::nil(),
            bucket: "uploads".into(),
            key: "u/1/report.pdf".into(),
            file_name: "report.pdf".into(),
            file_size: 1024,
            file_type: "application/pdf".into(),
            user_id: Uuid::nil(),
            processing_options: ProcessingOptions::default(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert!(json.get("jobId").is_some());
        assert!(json.get("fileSize").is_some());
        assert!(json.get("processingOptions").is_some());
    }
}
