//! Batch consumer with partial-failure acknowledgement.
//!
//! A [`BatchConsumer`] pulls message batches from a [`Queue`] and runs a
//! [`MessageHandler`] over them with bounded concurrency. Acknowledgement is
//! per message: when N messages are received and M handlers fail, only those
//! M return to the queue for redelivery; the N−M successes are acked
//! individually and never re-processed because of a sibling's failure.
//!
//! An optional batching window lets low-volume consumers coalesce a few
//! messages per batch without waiting indefinitely.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::queue::{Delivery, Queue};

/// Configuration for a batch consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Maximum number of messages per batch.
    pub batch_size: usize,
    /// Maximum number of handlers running at once within a batch.
    pub max_concurrency: usize,
    /// How long to wait for a first message before re-polling.
    pub poll_interval: Duration,
    /// If set, after the first message arrives, wait up to this long for the
    /// batch to fill before processing.
    pub batch_window: Option<Duration>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_concurrency: 4,
            poll_interval: Duration::from_secs(5),
            batch_window: None,
        }
    }
}

impl ConsumerConfig {
    /// Single-message batches with no intra-batch concurrency.
    pub fn serial() -> Self {
        Self {
            batch_size: 1,
            max_concurrency: 1,
            ..Default::default()
        }
    }
}

/// Handler invoked once per delivered message.
///
/// Returning `Err` nacks the message for redelivery; the queue's receive
/// budget and dead-letter queue bound how often that can happen. Handlers
/// must be idempotent: delivery is at-least-once.
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process a single delivery.
    async fn handle(&self, delivery: &Delivery) -> Result<()>;
}

/// What actually happened to a processed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    /// Messages acknowledged.
    pub succeeded: usize,
    /// Messages returned for redelivery.
    pub failed: usize,
}

/// Pulls batches from a queue and dispatches them to a handler.
pub struct BatchConsumer {
    queue: Arc<Queue>,
    handler: Arc<dyn MessageHandler>,
    config: ConsumerConfig,
}

impl BatchConsumer {
    /// Create a consumer with default configuration.
    pub fn new(queue: Arc<Queue>, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            queue,
            handler,
            config: ConsumerConfig::default(),
        }
    }

    /// Create a consumer with custom configuration.
    pub fn with_config(
        queue: Arc<Queue>,
        handler: Arc<dyn MessageHandler>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            queue,
            handler,
            config,
        }
    }

    /// Run until the cancellation token fires.
    ///
    /// The in-progress batch is allowed to finish before the loop exits, so
    /// shutdown never abandons claimed messages mid-handler.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            queue = %self.queue.name(),
            batch_size = self.config.batch_size,
            max_concurrency = self.config.max_concurrency,
            "consumer starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let batch = tokio::select! {
                _ = shutdown.cancelled() => break,
                batch = self.collect_batch() => batch,
            };

            if batch.is_empty() {
                continue;
            }

            let count = batch.len();
            let report = self.process_batch(batch).await;
            if report.failed > 0 {
                warn!(
                    queue = %self.queue.name(),
                    received = count,
                    succeeded = report.succeeded,
                    failed = report.failed,
                    "batch completed with failures, failed messages returned for redelivery"
                );
            } else {
                debug!(
                    queue = %self.queue.name(),
                    succeeded = report.succeeded,
                    "batch completed"
                );
            }
        }

        info!(queue = %self.queue.name(), "consumer stopped");
    }

    /// Collect a batch, honoring the batching window if configured.
    async fn collect_batch(&self) -> Vec<Delivery> {
        let mut batch = self
            .queue
            .receive_wait(self.config.batch_size, self.config.poll_interval)
            .await;

        if let Some(window) = self.config.batch_window {
            if !batch.is_empty() {
                let deadline = Instant::now() + window;
                while batch.len() < self.config.batch_size {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    let more = self
                        .queue
                        .receive_wait(self.config.batch_size - batch.len(), deadline - now)
                        .await;
                    if more.is_empty() {
                        break;
                    }
                    batch.extend(more);
                }
            }
        }

        batch
    }

    /// Process one batch with bounded concurrency, acking successes and
    /// nacking failures individually.
    pub async fn process_batch(&self, batch: Vec<Delivery>) -> BatchReport {
        let results: Vec<bool> = futures::stream::iter(batch.into_iter().map(|delivery| {
            let handler = self.handler.clone();
            let queue = self.queue.clone();
            async move {
                match handler.handle(&delivery).await {
                    Ok(()) => {
                        if let Err(e) = queue.ack(&delivery.receipt).await {
                            // The visibility timeout lapsed mid-handler; the
                            // redelivered copy is now authoritative.
                            debug!(
                                message_id = %delivery.message_id,
                                error = %e,
                                "ack rejected"
                            );
                        }
                        true
                    }
                    Err(e) => {
                        warn!(
                            message_id = %delivery.message_id,
                            receive_count = delivery.receive_count,
                            error = %e,
                            "handler failed, message returned for redelivery"
                        );
                        if let Err(e) = queue.nack(&delivery.receipt).await {
                            debug!(
                                message_id = %delivery.message_id,
                                error = %e,
                                "nack rejected"
                            );
                        }
                        false
                    }
                }
            }
        }))
        .buffer_unordered(self.config.max_concurrency.max(1))
        .collect()
        .await;

        let succeeded = results.iter().filter(|ok| **ok).count();
        BatchReport {
            succeeded,
            failed: results.len() - succeeded,
        }
    }
}
