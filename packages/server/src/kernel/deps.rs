//! Server dependencies for pipeline components (using traits for testability)
//!
//! This module provides the central dependency container used by the upload
//! coordinator, workers, and dispatcher. All external services use trait
//! abstractions to enable testing.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use mailgun::{MailgunService, OutboundMessage};
use uuid::Uuid;

use crate::domains::jobs::store::JobStore;
use crate::domains::notifications::templates::NotificationLinks;
use crate::domains::processing::router::ProcessingQueues;
use crate::kernel::traits::{BaseDocumentProcessor, BaseMailer, BaseObjectStore, RenderedEmail};

// =============================================================================
// MailgunService Adapter (implements BaseMailer trait)
// =============================================================================

/// Wrapper around MailgunService that implements the BaseMailer trait
pub struct MailgunAdapter(pub Arc<MailgunService>);

impl MailgunAdapter {
    pub fn new(service: Arc<MailgunService>) -> Self {
        Self(service)
    }
}

#[async_trait]
impl BaseMailer for MailgunAdapter {
    async fn send(&self, email: &RenderedEmail) -> Result<()> {
        self.0
            .send_message(&OutboundMessage {
                to: email.to.clone(),
                subject: email.subject.clone(),
                text: email.text.clone(),
                html: email.html.clone(),
            })
            .await
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!("{}", e))
    }
}

// =============================================================================
// ServerDeps
// =============================================================================

/// Dependencies accessible to the pipeline components.
#[derive(Clone)]
pub struct ServerDeps {
    pub job_store: Arc<dyn JobStore>,
    pub object_store: Arc<dyn BaseObjectStore>,
    pub mailer: Arc<dyn BaseMailer>,
    /// The opaque processing function run inside workers.
    pub processor: Arc<dyn BaseDocumentProcessor>,
    pub queues: Arc<ProcessingQueues>,
    pub upload_bucket: String,
    /// Files at or above this size route to the high-memory tier.
    pub large_file_threshold: u64,
    /// Retention window applied to every job-record write.
    pub job_retention: Duration,
    pub notification_links: NotificationLinks,
    pub admin_user_ids: Vec<Uuid>,
}

impl ServerDeps {
    /// Whether the user may act on jobs they do not own.
    pub fn is_admin(&self, user_id: Uuid) -> bool {
        self.admin_user_ids.contains(&user_id)
    }
}
