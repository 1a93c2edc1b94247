//! # Conveyor
//!
//! An in-process message queue with the delivery semantics asynchronous
//! pipelines actually need: visibility timeouts, bounded receive budgets,
//! dead-letter routing, and batch consumption with partial-failure
//! acknowledgement.
//!
//! ## Architecture
//!
//! ```text
//! Producer ──send()──► Queue (pending)
//!                        │
//!                        ▼ receive()        visibility timeout
//!                      in-flight ──────────────────┐
//!                        │                         │ expired
//!            ack() ──────┤                         ▼
//!          (removed)     │ nack()              pending (redelivery)
//!                        ▼                         │
//!                      pending ◄───────────────────┘
//!                        │
//!                        │ receive_count >= max_receive_count
//!                        ▼
//!                 dead-letter Queue (terminal record)
//! ```
//!
//! ## Guarantees
//!
//! - **At-least-once delivery**: an unacknowledged message is redelivered
//!   after its visibility timeout; handlers must be idempotent.
//! - **Single-consumer exclusivity**: while a message is in flight, no other
//!   consumer can receive it; late acks on redelivered messages are rejected
//!   as stale.
//! - **Bounded retries**: once a message has been received
//!   `max_receive_count` times without an ack, it moves to the dead-letter
//!   queue and is never delivered again from the source queue.
//! - **Partial batch failure**: [`BatchConsumer`] acks and nacks per
//!   message, so one failure never re-processes its batch siblings.
//!
//! Conveyor owns delivery semantics only. Policy (what a message means, how
//! handlers recover, what happens to dead letters) belongs to the
//! application.

pub mod consumer;
pub mod error;
pub mod queue;

pub use consumer::{BatchConsumer, BatchReport, ConsumerConfig, MessageHandler};
pub use error::ConveyorError;
pub use queue::{Delivery, EnqueueOutcome, Queue, QueueConfig, ReceiptHandle};
