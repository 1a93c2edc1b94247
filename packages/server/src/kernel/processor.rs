//! Stand-in processing engine.
//!
//! The real extraction/chunking engine is an external collaborator reached
//! through [`BaseDocumentProcessor`]. This implementation backs dev
//! deployments: it acknowledges the stored object and produces a metadata
//! summary as the extracted text, streaming one intermediate snapshot so
//! the progress path is exercised end to end.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::traits::{BaseDocumentProcessor, ProcessorError, ProcessorInput};
use crate::domains::jobs::models::{ProcessingOptions, ResponseData, UsageMetadata};

pub struct EchoProcessor;

#[async_trait]
impl BaseDocumentProcessor for EchoProcessor {
    async fn process(
        &self,
        input: ProcessorInput,
        partials: mpsc::Sender<String>,
    ) -> Result<ResponseData, ProcessorError> {
        let header = format!("# {}\n", input.file_name);
        let _ = partials.send(header.clone()).await;

        match input.options {
            ProcessingOptions::TextExtraction { .. } => Ok(ResponseData::Text {
                text: format!(
                    "{header}\n{size} bytes of {kind} stored at {bucket}/{key}",
                    size = input.file_size,
                    kind = input.file_type,
                    bucket = input.bucket,
                    key = input.key,
                ),
                usage: Some(UsageMetadata {
                    input_bytes: Some(input.file_size.max(0) as u64),
                    output_chars: None,
                    processing_ms: None,
                }),
            }),
            ProcessingOptions::PreviewRender { width, height } => Ok(ResponseData::Image {
                image_key: format!("{}.preview.png", input.key),
                generation_params: serde_json::json!({ "width": width, "height": height }),
                usage: None,
            }),
        }
    }
}
