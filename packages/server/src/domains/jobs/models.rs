//! Job model for asynchronous document processing.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use typed_builder::TypedBuilder;
use uuid::Uuid;

// ============================================================================
// Enums
// ============================================================================

/// Lifecycle state of a job. Transitions are monotonic: a job only ever
/// moves forward in this ordering, and the three terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Uploading,
    Processing,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Position in the forward-only ordering. Terminal states share the top
    /// rank: none of them is reachable from another.
    fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Uploading => 1,
            JobStatus::Processing => 2,
            JobStatus::Streaming => 3,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => 4,
        }
    }

    /// True for states the job can never leave.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether a transition to `next` is allowed.
    ///
    /// Forward-only: the rank must strictly increase, and terminal states
    /// accept no transition at all.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Uploading => "uploading",
            JobStatus::Processing => "processing",
            JobStatus::Streaming => "streaming",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration handed through to the worker, keyed by processing kind so
/// consumers pattern-match instead of probing optional fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessingOptions {
    /// Extract text content from the document.
    TextExtraction {
        #[serde(skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        #[serde(default)]
        include_summary: bool,
    },
    /// Render a preview image of the document.
    PreviewRender {
        #[serde(default = "default_preview_width")]
        width: u32,
        #[serde(default = "default_preview_height")]
        height: u32,
    },
}

fn default_preview_width() -> u32 {
    1024
}

fn default_preview_height() -> u32 {
    768
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        ProcessingOptions::TextExtraction {
            language: None,
            include_summary: false,
        }
    }
}

/// Typed result payload. Present exactly when the job is completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseData {
    /// Extracted text content.
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<UsageMetadata>,
    },
    /// A rendered image reference plus the parameters that produced it.
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

/// Attempted transition that would regress or leave a terminal state.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("invalid status transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

// ============================================================================
// Job Model
// ============================================================================

/// The central pipeline entity: one uploaded file, its lifecycle state, and
/// its eventual result.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,

    // Ownership: exactly one owner; only the owner or an admin may query or
    // cancel.
    pub user_id: Uuid,

    // Descriptive
    pub file_name: String,
    pub file_size: i64,
    pub file_type: String,
    #[builder(default)]
    pub processing_options: ProcessingOptions,

    // Upload bookkeeping
    #[builder(default, setter(strip_option))]
    pub upload_id: Option<String>,
    #[builder(default, setter(strip_option))]
    pub storage_key: Option<String>,

    // Lifecycle
    #[builder(default)]
    pub status: JobStatus,
    #[builder(default, setter(strip_option))]
    pub partial_content: Option<String>,
    #[builder(default = 0)]
    pub poll_attempts: i32,
    #[builder(default = 0)]
    pub delivery_attempts: i32,

    // Result
    #[builder(default, setter(strip_option))]
    pub response_data: Option<ResponseData>,
    #[builder(default, setter(strip_option))]
    pub error_message: Option<String>,

    // Notification
    #[builder(default, setter(strip_option))]
    pub notify_email: Option<String>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,

    /// Absolute expiry. Refreshed on every status write, so an actively
    /// progressing job never expires; a record is purgeable once `ttl` has
    /// passed regardless of status.
    pub ttl: DateTime<Utc>,
}

impl Job {
    /// Expiry instant for a record touched now.
    pub fn ttl_from_now(retention: Duration) -> DateTime<Utc> {
        Utc::now() + ChronoDuration::from_std(retention).unwrap_or(ChronoDuration::hours(48))
    }

    /// Whether the record is past its retention window.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.ttl <= now
    }

    /// Move the job forward. Rejects regressions and exits from terminal
    /// states; refreshes `updated_at` and `ttl` on success.
    pub fn transition_to(
        &mut self,
        next: JobStatus,
        retention: Duration,
    ) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        self.ttl = Self::ttl_from_now(retention);
        Ok(())
    }

    /// Record a successful result. `response_data` is set if and only if the
    /// job is completed.
    pub fn complete(
        &mut self,
        data: ResponseData,
        retention: Duration,
    ) -> Result<(), InvalidTransition> {
        self.transition_to(JobStatus::Completed, retention)?;
        self.response_data = Some(data);
        self.error_message = None;
        Ok(())
    }

    /// Record a processing failure. `error_message` is set if and only if
    /// the job failed.
    pub fn fail(
        &mut self,
        message: impl Into<String>,
        retention: Duration,
    ) -> Result<(), InvalidTransition> {
        self.transition_to(JobStatus::Failed, retention)?;
        self.error_message = Some(message.into());
        self.response_data = None;
        Ok(())
    }

    /// Cooperative cancellation: a status write the worker observes.
    pub fn cancel(&mut self, retention: Duration) -> Result<(), InvalidTransition> {
        self.transition_to(JobStatus::Cancelled, retention)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_job(status: JobStatus) -> Job {
        Job::builder()
            .user_id(Uuid::new_v4())
            .file_name("report.pdf")
            .file_size(1024i64)
            .file_type("application/pdf")
            .status(status)
            .ttl(Job::ttl_from_now(Duration::from_secs(3600)))
            .build()
    }

    #[test]
    fn test_status_never_regresses() {
        let order = [
            JobStatus::Pending,
            JobStatus::Uploading,
            JobStatus::Processing,
            JobStatus::Streaming,
        ];
        for (i, from) in order.iter().enumerate() {
            for to in &order[..=i] {
                assert!(!from.can_transition_to(*to), "{from} -> {to} must be rejected");
            }
            for to in &order[i + 1..] {
                assert!(from.can_transition_to(*to), "{from} -> {to} must be allowed");
            }
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled] {
            for next in [
                JobStatus::Pending,
                JobStatus::Processing,
                JobStatus::Streaming,
                JobStatus::Completed,
                JobStatus::Failed,
                JobStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_skipping_intermediate_states_is_allowed() {
        // A small document may never visibly stream.
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Cancelled));
    }

    #[test]
    fn test_complete_sets_response_data_only() {
        let mut job = test_job(JobStatus::Processing);
        job.complete(
            ResponseData::Text {
                text: "X".into(),
                usage: None,
            },
            Duration::from_secs(3600),
        )
        .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.response_data.is_some());
        assert!(job.error_message.is_none());
    }

    #[test]
    fn test_fail_sets_error_message_only() {
        let mut job = test_job(JobStatus::Processing);
        job.fail("timeout", Duration::from_secs(3600)).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("timeout"));
        assert!(job.response_data.is_none());
    }

    #[test]
    fn test_cancel_after_completion_is_rejected() {
        let mut job = test_job(JobStatus::Processing);
        job.complete(
            ResponseData::Text {
                text: "done".into(),
                usage: None,
            },
            Duration::from_secs(3600),
        )
        .unwrap();
        assert!(job.cancel(Duration::from_secs(3600)).is_err());
    }

    #[test]
    fn test_transition_refreshes_ttl() {
        let mut job = test_job(JobStatus::Pending);
        job.ttl = Utc::now() - ChronoDuration::seconds(10);
        assert!(job.is_expired(Utc::now()));

        job.transition_to(JobStatus::Uploading, Duration::from_secs(3600))
            .unwrap();
        assert!(!job.is_expired(Utc::now()));
    }

    #[test]
    fn test_processing_options_tagged_serialization() {
        let opts = ProcessingOptions::TextExtraction {
            language: Some("en".into()),
            include_summary: true,
        };
        let json = serde_json::to_value(&opts).unwrap();
        assert_eq!(json["type"], "text_extraction");

        let back: ProcessingOptions = serde_json::from_value(json).unwrap();
        assert_eq!(back, opts);
    }
}
