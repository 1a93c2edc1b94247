//! Resource profiles for the worker tiers.
//!
//! One worker implementation serves both tiers; only the profile differs.
//! The standard tier trades per-document isolation for throughput; the
//! high-memory tier processes one document at a time with a longer
//! visibility window and a smaller retry budget, since its failures are
//! expensive to repeat.

use std::time::Duration;

use conveyor::{ConsumerConfig, QueueConfig};

use super::router::QueueTier;

/// Tuning for one worker tier.
#[derive(Debug, Clone)]
pub struct ResourceProfile {
    pub tier: QueueTier,
    /// Must exceed the tier's worst-case processing duration.
    pub visibility_timeout: Duration,
    /// Deliveries before a message lands in the shared DLQ.
    pub max_receive_count: u32,
    /// Messages pulled per batch.
    pub batch_size: usize,
    /// Documents processed concurrently within a batch.
    pub max_concurrency: usize,
}

impl ResourceProfile {
    /// Standard tier: typical extractions, several documents in flight.
    pub fn standard() -> Self {
        Self {
            tier: QueueTier::Standard,
            visibility_timeout: Duration::from_secs(5 * 60),
            max_receive_count: 5,
            batch_size: 5,
            max_concurrency: 4,
        }
    }

    /// High-memory tier: large payloads, one document at a time.
    pub fn high_memory() -> Self {
        Self {
            tier: QueueTier::HighMemory,
            visibility_timeout: Duration::from_secs(15 * 60),
            max_receive_count: 2,
            batch_size: 1,
            max_concurrency: 1,
        }
    }

    /// Queue configuration for this tier.
    pub fn queue_config(&self, name: impl Into<String>) -> QueueConfig {
        QueueConfig::new(name)
            .with_visibility_timeout(self.visibility_timeout)
            .with_max_receive_count(self.max_receive_count)
    }

    /// Consumer configuration for this tier.
    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            batch_size: self.batch_size,
            max_concurrency: self.max_concurrency,
            ..ConsumerConfig::default()
        }
    }
}
