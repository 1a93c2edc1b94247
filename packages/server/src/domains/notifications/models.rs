//! Notification entity.
//!
//! A notification is decoupled from its job by an event on the notification
//! queue, not a foreign key: once enqueued it carries everything the
//! dispatcher needs, so job records can expire without stranding it.
//! Delivery attempts are tracked by the queue's receive count.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::templates::NotificationLinks;
use crate::domains::jobs::models::{Job, JobStatus, ResponseData};

/// Logical, provider-agnostic template fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateFields {
    pub subject: String,
    pub greeting: String,
    pub schedule_name: String,
    pub status: String,
    pub execution_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub results_url: String,
    pub manage_schedules_url: String,
    pub unsubscribe_url: String,
    pub preferences_url: String,
}

/// One queued completion notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Correlation back to the originating job.
    pub job_id: Uuid,
    pub recipient: String,
    pub fields: TemplateFields,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Build the notification for a job that reached a terminal outcome.
    ///
    /// Returns `None` when the job requested no notification or is not in a
    /// notifiable state.
    pub fn for_job(job: &Job, links: &NotificationLinks, execution_ms: u64) -> Option<Self> {
        let recipient = job.notify_email.clone()?;

        let (status, subject) = match job.status {
            JobStatus::Completed => (
                "completed",
                format!("Your document \"{}\" is ready", job.file_name),
            ),
            JobStatus::Failed => (
                "failed",
                format!("Processing failed for \"{}\"", job.file_name),
            ),
            _ => return None,
        };

        let summary = job.response_data.as_ref().map(|data| match data {
            ResponseData::Text { text, .. } => {
                let mut snippet: String = text.chars().take(200).collect();
                if text.chars().count() > 200 {
                    snippet.push('…');
                }
                snippet
            }
            ResponseData::Image { image_key, .. } => format!("Preview rendered: {image_key}"),
        });

        Some(Self {
            job_id: job.id,
            recipient,
            fields: TemplateFields {
                subject,
                greeting: "Hi there,".to_string(),
                schedule_name: job.file_name.clone(),
                status: status.to_string(),
                execution_time: format_execution_time(execution_ms),
                summary,
                error_message: job.error_message.clone(),
                results_url: links.results_url(job.id),
                manage_schedules_url: links.manage_schedules_url.clone(),
                unsubscribe_url: links.unsubscribe_url.clone(),
                preferences_url: links.preferences_url.clone(),
            },
            created_at: Utc::now(),
        })
    }
}

fn format_execution_time(ms: u64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn job_with_email(status: JobStatus) -> Job {
        let mut job = Job::builder()
            .user_id(Uuid::new_v4())
            .file_name("report.pdf")
            .file_size(1024i64)
            .file_type("application/pdf")
            .notify_email("user@example.com".to_string())
            .ttl(Job::ttl_from_now(Duration::from_secs(3600)))
            .build();
        job.status = status;
        job
    }

    fn links() -> NotificationLinks {
        NotificationLinks::from_base_url("https://app.example.com")
    }

    #[test]
    fn test_completed_notification() {
        let mut job = job_with_email(JobStatus::Completed);
        job.response_data = Some(ResponseData::Text {
            text: "extracted".into(),
            usage: None,
        });

        let notification = Notification::for_job(&job, &links(), 2500).unwrap();
        assert_eq!(notification.recipient, "user@example.com");
        assert_eq!(notification.fields.status, "completed");
        assert_eq!(notification.fields.execution_time, "2.5s");
        assert_eq!(notification.fields.summary.as_deref(), Some("extracted"));
        assert!(notification.fields.results_url.contains(&job.id.to_string()));
    }

    #[test]
    fn test_failed_notification_carries_error() {
        let mut job = job_with_email(JobStatus::Failed);
        job.error_message = Some("timeout".into());

        let notification = Notification::for_job(&job, &links(), 100).unwrap();
        assert_eq!(notification.fields.status, "failed");
        assert_eq!(notification.fields.error_message.as_deref(), Some("timeout"));
        assert!(notification.fields.summary.is_none());
    }

    #[test]
    fn test_no_email_means_no_notification() {
        let mut job = job_with_email(JobStatus::Completed);
        job.notify_email = None;
        assert!(Notification::for_job(&job, &links(), 0).is_none());
    }

    #[test]
    fn test_non_terminal_job_is_not_notifiable() {
        let job = job_with_email(JobStatus::Processing);
        assert!(Notification::for_job(&job, &links(), 0).is_none());
    }
}
