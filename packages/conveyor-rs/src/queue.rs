//! In-process queue with SQS-style delivery semantics.
//!
//! A [`Queue`] hands messages to consumers under a **visibility timeout**:
//! a received message stays invisible to other consumers until it is
//! acknowledged, negatively acknowledged, or the timeout lapses. Every
//! delivery increments the message's receive count; once the count reaches
//! the queue's `max_receive_count`, the message is routed to the configured
//! dead-letter queue instead of being delivered again.
//!
//! Delivery is at-least-once and possibly out of order after redelivery.
//! Consumers must be idempotent.
//!
//! # Example
//!
//! ```ignore
//! let dlq = Arc::new(Queue::new(QueueConfig::new("jobs-dlq")));
//! let queue = Queue::new(
//!     QueueConfig::new("jobs")
//!         .with_visibility_timeout(Duration::from_secs(120))
//!         .with_max_receive_count(5),
//! )
//! .with_dead_letter(dlq.clone());
//!
//! queue.send(&MyMessage { .. }).await?;
//!
//! for delivery in queue.receive(10).await {
//!     match handle(&delivery).await {
//!         Ok(()) => queue.ack(&delivery.receipt).await?,
//!         Err(_) => queue.nack(&delivery.receipt).await?,
//!     }
//! }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ConveyorError;

/// Configuration for a queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Queue name, used in logs and dead-letter attribution.
    pub name: String,
    /// How long a received message stays invisible before redelivery.
    pub visibility_timeout: Duration,
    /// Deliveries allowed before the message is dead-lettered.
    pub max_receive_count: u32,
}

impl QueueConfig {
    /// Create a config with defaults (30s visibility, 5 receives).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visibility_timeout: Duration::from_secs(30),
            max_receive_count: 5,
        }
    }

    /// Override the visibility timeout.
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Override the maximum receive count.
    pub fn with_max_receive_count(mut self, count: u32) -> Self {
        self.max_receive_count = count;
        self
    }
}

/// Result of an enqueue that carries a deduplication key.
#[derive(Debug, Clone)]
pub enum EnqueueOutcome {
    /// Message was enqueued, returns new message ID.
    Created(Uuid),
    /// An undelivered message with the same key exists, returns its ID.
    Duplicate(Uuid),
}

impl EnqueueOutcome {
    /// Get the message ID regardless of outcome.
    pub fn message_id(&self) -> Uuid {
        match self {
            EnqueueOutcome::Created(id) | EnqueueOutcome::Duplicate(id) => *id,
        }
    }

    /// Returns true if this enqueue created a new message.
    pub fn is_created(&self) -> bool {
        matches!(self, EnqueueOutcome::Created(_))
    }
}

/// A message as stored by the queue.
#[derive(Debug, Clone)]
struct StoredMessage {
    id: Uuid,
    payload: serde_json::Value,
    dedupe_key: Option<String>,
    enqueued_at: DateTime<Utc>,
    receive_count: u32,
}

/// Bookkeeping for a message that is currently invisible.
struct InFlight {
    token: Uuid,
    deadline: Instant,
    message: StoredMessage,
}

/// Proof of a specific delivery, required to ack or nack.
///
/// Receipts are single-use: once the message is redelivered (visibility
/// expiry) the old receipt is rejected as stale.
#[derive(Debug, Clone)]
pub struct ReceiptHandle {
    message_id: Uuid,
    token: Uuid,
}

impl ReceiptHandle {
    /// The message this receipt belongs to.
    pub fn message_id(&self) -> Uuid {
        self.message_id
    }
}

/// A message handed to a consumer.
#[derive(Debug)]
pub struct Delivery {
    /// Stable message ID (survives redelivery).
    pub message_id: Uuid,
    /// The message payload.
    pub payload: serde_json::Value,
    /// Which delivery this is, 1-based.
    pub receive_count: u32,
    /// When the message was first enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// Receipt for ack/nack of this delivery.
    pub receipt: ReceiptHandle,
}

impl Delivery {
    /// Deserialize the payload into a typed message.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, ConveyorError> {
        serde_json::from_value(self.payload.clone()).map_err(ConveyorError::Decode)
    }
}

struct Inner {
    pending: VecDeque<StoredMessage>,
    in_flight: HashMap<Uuid, InFlight>,
}

/// An in-process queue with visibility timeouts and dead-letter routing.
pub struct Queue {
    config: QueueConfig,
    dead_letter: Option<Arc<Queue>>,
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Queue {
    /// Create a new queue.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            dead_letter: None,
            inner: Mutex::new(Inner {
                pending: VecDeque::new(),
                in_flight: HashMap::new(),
            }),
            notify: Notify::new(),
        }
    }

    /// Attach a dead-letter queue. Messages exceeding the receive budget are
    /// moved there with their receive count intact.
    pub fn with_dead_letter(mut self, dlq: Arc<Queue>) -> Self {
        self.dead_letter = Some(dlq);
        self
    }

    /// Queue name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Enqueue a message.
    pub async fn send<T: Serialize>(&self, payload: &T) -> Result<Uuid, ConveyorError> {
        let value = serde_json::to_value(payload).map_err(ConveyorError::Encode)?;
        Ok(self.push(value, None).await)
    }

    /// Enqueue a message with a deduplication key.
    ///
    /// If a pending or in-flight message already carries the same key, no new
    /// message is created and the existing ID is returned.
    pub async fn send_with_dedupe<T: Serialize>(
        &self,
        payload: &T,
        dedupe_key: &str,
    ) -> Result<EnqueueOutcome, ConveyorError> {
        let value = serde_json::to_value(payload).map_err(ConveyorError::Encode)?;

        {
            let inner = self.inner.lock().await;
            let existing = inner
                .pending
                .iter()
                .chain(inner.in_flight.values().map(|f| &f.message))
                .find(|m| m.dedupe_key.as_deref() == Some(dedupe_key));
            if let Some(existing) = existing {
                debug!(
                    queue = %self.config.name,
                    message_id = %existing.id,
                    dedupe_key,
                    "enqueue deduplicated"
                );
                return Ok(EnqueueOutcome::Duplicate(existing.id));
            }
        }

        let id = self.push(value, Some(dedupe_key.to_string())).await;
        Ok(EnqueueOutcome::Created(id))
    }

    async fn push(&self, payload: serde_json::Value, dedupe_key: Option<String>) -> Uuid {
        let message = StoredMessage {
            id: Uuid::new_v4(),
            payload,
            dedupe_key,
            enqueued_at: Utc::now(),
            receive_count: 0,
        };
        let id = message.id;
        self.inner.lock().await.pending.push_back(message);
        self.notify.notify_waiters();
        id
    }

    /// Re-enqueue a stored message, preserving its ID and receive count.
    /// Used for dead-letter moves between queues.
    async fn push_stored(&self, message: StoredMessage) {
        self.inner.lock().await.pending.push_back(message);
        self.notify.notify_waiters();
    }

    /// Receive up to `max` messages without waiting.
    ///
    /// Expired in-flight messages are returned to the pending set first, so
    /// redelivery happens on the next receive after the visibility timeout.
    pub async fn receive(&self, max: usize) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        let mut dead_lettered = Vec::new();

        {
            let mut inner = self.inner.lock().await;
            self.sweep_expired(&mut inner);

            while deliveries.len() < max {
                let Some(mut message) = inner.pending.pop_front() else {
                    break;
                };

                if message.receive_count >= self.config.max_receive_count {
                    dead_lettered.push(message);
                    continue;
                }

                message.receive_count += 1;
                let token = Uuid::new_v4();
                deliveries.push(Delivery {
                    message_id: message.id,
                    payload: message.payload.clone(),
                    receive_count: message.receive_count,
                    enqueued_at: message.enqueued_at,
                    receipt: ReceiptHandle {
                        message_id: message.id,
                        token,
                    },
                });
                inner.in_flight.insert(
                    message.id,
                    InFlight {
                        token,
                        deadline: Instant::now() + self.config.visibility_timeout,
                        message,
                    },
                );
            }
        }

        for message in dead_lettered {
            match &self.dead_letter {
                Some(dlq) => {
                    warn!(
                        queue = %self.config.name,
                        message_id = %message.id,
                        receive_count = message.receive_count,
                        "receive budget exhausted, moving message to dead-letter queue"
                    );
                    dlq.push_stored(message).await;
                }
                None => {
                    warn!(
                        queue = %self.config.name,
                        message_id = %message.id,
                        "receive budget exhausted and no dead-letter queue configured, dropping"
                    );
                }
            }
        }

        deliveries
    }

    /// Receive up to `max` messages, waiting up to `timeout` for the first.
    pub async fn receive_wait(&self, max: usize, timeout: Duration) -> Vec<Delivery> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register for send notifications before checking the queue, so a
            // send racing with an empty receive is not missed.
            let mut notified = std::pin::pin!(self.notify.notified());
            notified.as_mut().enable();

            let batch = self.receive(max).await;
            if !batch.is_empty() {
                return batch;
            }

            let now = Instant::now();
            if now >= deadline {
                return Vec::new();
            }

            // Wake on new sends, or in time to sweep the next visibility
            // expiry, whichever comes first.
            let mut wait = deadline - now;
            if let Some(expiry) = self.next_expiry().await {
                wait = wait.min(expiry.saturating_duration_since(now).max(Duration::from_millis(1)));
            }
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Acknowledge a delivery, removing the message permanently.
    pub async fn ack(&self, receipt: &ReceiptHandle) -> Result<(), ConveyorError> {
        let mut inner = self.inner.lock().await;
        let current = inner
            .in_flight
            .get(&receipt.message_id)
            .map(|flight| flight.token);
        if current != Some(receipt.token) {
            return Err(ConveyorError::StaleReceipt {
                message_id: receipt.message_id,
            });
        }
        inner.in_flight.remove(&receipt.message_id);
        Ok(())
    }

    /// Negatively acknowledge a delivery, making the message immediately
    /// visible again. The receive count is retained, so repeated nacks
    /// consume the receive budget.
    pub async fn nack(&self, receipt: &ReceiptHandle) -> Result<(), ConveyorError> {
        let mut inner = self.inner.lock().await;
        let current = inner
            .in_flight
            .get(&receipt.message_id)
            .map(|flight| flight.token);
        if current != Some(receipt.token) {
            return Err(ConveyorError::StaleReceipt {
                message_id: receipt.message_id,
            });
        }
        if let Some(flight) = inner.in_flight.remove(&receipt.message_id) {
            inner.pending.push_back(flight.message);
        }
        drop(inner);
        self.notify.notify_waiters();
        Ok(())
    }

    /// Number of messages waiting for delivery.
    pub async fn depth(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    /// Number of messages currently invisible.
    pub async fn in_flight(&self) -> usize {
        self.inner.lock().await.in_flight.len()
    }

    /// Move expired in-flight messages back to pending.
    fn sweep_expired(&self, inner: &mut Inner) {
        let now = Instant::now();
        let expired: Vec<Uuid> = inner
            .in_flight
            .iter()
            .filter(|(_, f)| f.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            if let Some(flight) = inner.in_flight.remove(&id) {
                debug!(
                    queue = %self.config.name,
                    message_id = %id,
                    receive_count = flight.message.receive_count,
                    "visibility timeout expired, requeueing message"
                );
                inner.pending.push_back(flight.message);
            }
        }
    }

    /// Earliest visibility deadline among in-flight messages.
    async fn next_expiry(&self) -> Option<Instant> {
        let inner = self.inner.lock().await;
        inner.in_flight.values().map(|f| f.deadline).min()
    }
}
