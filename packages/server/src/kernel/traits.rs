// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic. The pipeline
// reaches every external collaborator (object storage, email provider, the
// extraction engine) through these seams, so all of them can be swapped for
// mocks in tests.
//
// Naming convention: Base* for trait names (e.g., BaseObjectStore)

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domains::jobs::models::{ProcessingOptions, ResponseData};

// =============================================================================
// Object Store (S3-equivalent, multipart upload lifecycle)
// =============================================================================

/// Result of initiating a multipart upload.
#[derive(Debug, Clone)]
pub struct MultipartInit {
    /// Store-assigned upload session ID.
    pub upload_id: String,
    /// Pre-authorized URLs, one per part, in part-number order.
    pub part_urls: Vec<String>,
}

/// One uploaded part, as reported back by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPart {
    /// 1-based part number.
    pub part_number: i32,
    /// Store-issued entity tag for the part.
    pub etag: String,
}

#[async_trait]
pub trait BaseObjectStore: Send + Sync {
    /// Begin a multipart upload and pre-authorize `part_count` part URLs.
    async fn initiate_multipart(
        &self,
        bucket: &str,
        key: &str,
        part_count: u32,
    ) -> Result<MultipartInit>;

    /// Finalize a multipart upload from its parts. Returns the object etag.
    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[UploadPart],
    ) -> Result<String>;

    /// Abandon a multipart upload, discarding uploaded parts.
    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()>;
}

// =============================================================================
// Mailer (email provider)
// =============================================================================

/// A fully rendered email ready to hand to the provider.
#[derive(Debug, Clone)]
pub struct RenderedEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
}

#[async_trait]
pub trait BaseMailer: Send + Sync {
    /// Send one email. Delivery is at-least-once from the pipeline's point
    /// of view; recipients must tolerate duplicates.
    async fn send(&self, email: &RenderedEmail) -> Result<()>;
}

// =============================================================================
// Document Processor (opaque extraction engine)
// =============================================================================

/// Input contract for the processing function.
#[derive(Debug, Clone)]
pub struct ProcessorInput {
    pub bucket: String,
    pub key: String,
    pub file_name: String,
    pub file_size: i64,
    pub file_type: String,
    pub options: ProcessingOptions,
}

/// Processing failure, classified for retry decisions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProcessorError {
    /// Transient (store hiccup, resource pressure); queue-level redelivery
    /// will retry up to the tier's receive budget.
    #[error("{message}")]
    Retryable { message: String },

    /// Permanent (corrupt document, unsupported format); the job is failed
    /// once and never retried by the application.
    #[error("{message}")]
    Fatal { message: String },
}

impl ProcessorError {
    pub fn retryable(message: impl Into<String>) -> Self {
        ProcessorError::Retryable {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        ProcessorError::Fatal {
            message: message.into(),
        }
    }

    /// Whether queue-level redelivery should retry this failure.
    pub fn should_retry(&self) -> bool {
        matches!(self, ProcessorError::Retryable { .. })
    }
}

#[async_trait]
pub trait BaseDocumentProcessor: Send + Sync {
    /// Run the extraction over a stored object.
    ///
    /// Intermediate content snapshots may be pushed through `partials` as
    /// they become available; the channel closing early must not fail the
    /// run (visible progress is best-effort).
    async fn process(
        &self,
        input: ProcessorInput,
        partials: mpsc::Sender<String>,
    ) -> Result<ResponseData, ProcessorError>;
}
