//! Size-based queue routing.
//!
//! Routing is a pure function of file size against a fixed threshold -
//! no other heuristic - so the decision is deterministic and trivially
//! testable. Both processing tiers share one dead-letter queue; the
//! notification pipeline has its own.

use std::sync::Arc;

use conveyor::{EnqueueOutcome, Queue, QueueConfig};
use tracing::info;

use super::messages::ProcessingMessage;
use super::profiles::ResourceProfile;
use crate::common::errors::ApiError;

/// Worker tier selected for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueTier {
    Standard,
    HighMemory,
}

/// Pick the tier for a file. Boundary-inclusive: a file exactly at the
/// threshold routes high-memory.
pub fn tier_for_size(file_size: u64, threshold: u64) -> QueueTier {
    if file_size >= threshold {
        QueueTier::HighMemory
    } else {
        QueueTier::Standard
    }
}

/// Retry budget for notification delivery before the DLQ.
const NOTIFICATION_MAX_RECEIVE_COUNT: u32 = 3;

/// The pipeline's queue topology.
pub struct ProcessingQueues {
    pub standard: Arc<Queue>,
    pub high_memory: Arc<Queue>,
    /// Shared terminal record for both processing tiers.
    pub processing_dlq: Arc<Queue>,
    pub notifications: Arc<Queue>,
    pub notifications_dlq: Arc<Queue>,
}

impl ProcessingQueues {
    /// Build the topology from the two tier profiles.
    pub fn from_profiles(standard: &ResourceProfile, high_memory: &ResourceProfile) -> Self {
        let processing_dlq = Arc::new(Queue::new(QueueConfig::new("processing-dlq")));
        let notifications_dlq = Arc::new(Queue::new(QueueConfig::new("notifications-dlq")));

        Self {
            standard: Arc::new(
                Queue::new(standard.queue_config("processing-standard"))
                    .with_dead_letter(processing_dlq.clone()),
            ),
            high_memory: Arc::new(
                Queue::new(high_memory.queue_config("processing-high-memory"))
                    .with_dead_letter(processing_dlq.clone()),
            ),
            processing_dlq,
            notifications: Arc::new(
                Queue::new(
                    QueueConfig::new("notifications")
                        .with_visibility_timeout(std::time::Duration::from_secs(60))
                        .with_max_receive_count(NOTIFICATION_MAX_RECEIVE_COUNT),
                )
                .with_dead_letter(notifications_dlq.clone()),
            ),
            notifications_dlq,
        }
    }

    /// Queue topology with default profiles.
    pub fn with_defaults() -> Self {
        Self::from_profiles(&ResourceProfile::standard(), &ResourceProfile::high_memory())
    }

    /// The queue serving a tier.
    pub fn for_tier(&self, tier: QueueTier) -> &Arc<Queue> {
        match tier {
            QueueTier::Standard => &self.standard,
            QueueTier::HighMemory => &self.high_memory,
        }
    }

    /// Route a processing message by file size and publish it.
    ///
    /// The job ID doubles as the deduplication key, so completing the same
    /// upload twice publishes a single message.
    pub async fn dispatch(
        &self,
        message: &ProcessingMessage,
        threshold: u64,
    ) -> Result<QueueTier, ApiError> {
        let tier = tier_for_size(message.file_size.max(0) as u64, threshold);
        let queue = self.for_tier(tier);

        let outcome = queue
            .send_with_dedupe(message, &message.job_id.to_string())
            .await
            .map_err(|e| ApiError::Retryable(format!("queue unavailable: {e}")))?;

        match &outcome {
            EnqueueOutcome::Created(_) => {
                info!(
                    job_id = %message.job_id,
                    queue = %queue.name(),
                    file_size = message.file_size,
                    "processing message dispatched"
                );
            }
            EnqueueOutcome::Duplicate(_) => {
                info!(
                    job_id = %message.job_id,
                    queue = %queue.name(),
                    "processing message already enqueued, skipping"
                );
            }
        }

        Ok(tier)
    }
}
