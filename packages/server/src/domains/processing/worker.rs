//! Document processing worker.
//!
//! One worker type serves both queue tiers; the [`ResourceProfile`] carries
//! everything that differs between them. The handler is idempotent against
//! the queue's at-least-once, possibly-out-of-order redelivery:
//!
//! 1. Look up the job; if it is already terminal, acknowledge and skip.
//! 2. Move to `processing`, then `streaming` as partial content appears.
//!    Progress snapshots are opportunistic; a dropped snapshot is not an
//!    error.
//! 3. On success, write `responseData`, mark `completed`, emit a
//!    notification event.
//! 4. On fatal failure, write `errorMessage`, mark `failed`, emit a
//!    notification event. Retryable failures are returned to the queue and
//!    redelivered up to the tier's receive budget; after that the DLQ holds
//!    the terminal record.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use conveyor::{BatchConsumer, Delivery, MessageHandler};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::messages::ProcessingMessage;
use super::profiles::ResourceProfile;
use crate::domains::jobs::models::{Job, JobStatus};
use crate::domains::jobs::store::{JobStore, JobStoreError};
use crate::domains::notifications::models::Notification;
use crate::kernel::deps::ServerDeps;
use crate::kernel::traits::ProcessorInput;

/// Queue consumer that runs the processing function over stored documents.
pub struct DocumentWorker {
    deps: Arc<ServerDeps>,
    profile: ResourceProfile,
}

impl DocumentWorker {
    pub fn new(deps: Arc<ServerDeps>, profile: ResourceProfile) -> Self {
        Self { deps, profile }
    }

    /// Wire this worker to its tier's queue.
    pub fn consumer(self) -> BatchConsumer {
        let queue = self.deps.queues.for_tier(self.profile.tier).clone();
        let config = self.profile.consumer_config();
        BatchConsumer::with_config(queue, Arc::new(self), config)
    }

    /// Enqueue the completion notification, if the job requested one.
    /// Best-effort: a lost notification never fails the job itself.
    async fn emit_notification(&self, job: &Job, execution_ms: u64) {
        let Some(notification) =
            Notification::for_job(job, &self.deps.notification_links, execution_ms)
        else {
            return;
        };

        if let Err(e) = self.deps.queues.notifications.send(&notification).await {
            error!(job_id = %job.id, error = %e, "failed to enqueue notification");
        }
    }

    /// Persist a job write, treating a lost race against a terminal
    /// transition (e.g. cancellation) as "stop work", not as a failure.
    async fn write_or_yield(&self, job: &Job) -> Result<WriteOutcome, JobStoreError> {
        match self.deps.job_store.update(job).await {
            Ok(()) => Ok(WriteOutcome::Written),
            Err(JobStoreError::InvalidTransition { from, to }) => {
                info!(
                    job_id = %job.id,
                    from = %from,
                    to = %to,
                    "job changed state concurrently, yielding"
                );
                Ok(WriteOutcome::Yielded)
            }
            Err(JobStoreError::NotFound { .. }) => Ok(WriteOutcome::Yielded),
            Err(other) => Err(other),
        }
    }
}

enum WriteOutcome {
    Written,
    Yielded,
}

#[async_trait]
impl MessageHandler for DocumentWorker {
    async fn handle(&self, delivery: &Delivery) -> Result<()> {
        let message: ProcessingMessage = delivery
            .deserialize()
            .context("processing message did not deserialize")?;
        let retention = self.deps.job_retention;

        // Idempotency guard: duplicate deliveries of finished work are a
        // no-op, not an error.
        let Some(mut job) = self.deps.job_store.get(message.job_id).await? else {
            warn!(
                job_id = %message.job_id,
                "job record missing (expired or purged), acknowledging message"
            );
            return Ok(());
        };
        if job.status.is_terminal() {
            debug!(
                job_id = %job.id,
                status = %job.status,
                "job already terminal, skipping redelivered message"
            );
            return Ok(());
        }

        let started = Instant::now();

        job.delivery_attempts = delivery.receive_count as i32;
        if job.status.can_transition_to(JobStatus::Processing) {
            job.transition_to(JobStatus::Processing, retention)
                .expect("transition checked");
        }
        if matches!(self.write_or_yield(&job).await?, WriteOutcome::Yielded) {
            return Ok(());
        }

        info!(
            job_id = %job.id,
            tier = ?self.profile.tier,
            attempt = delivery.receive_count,
            file_size = message.file_size,
            "processing document"
        );

        // Forward partial-content snapshots while the processor runs.
        let (partials_tx, partials_rx) = mpsc::channel::<String>(16);
        let forwarder = tokio::spawn(forward_partials(
            self.deps.job_store.clone(),
            job.id,
            retention,
            partials_rx,
        ));

        let input = ProcessorInput {
            bucket: message.bucket.clone(),
            key: message.key.clone(),
            file_name: message.file_name.clone(),
            file_size: message.file_size,
            file_type: message.file_type.clone(),
            options: message.processing_options.clone(),
        };
        let result = self.deps.processor.process(input, partials_tx).await;
        let _ = forwarder.await;

        // Reload: cancellation may have landed while we were processing.
        let Some(mut job) = self.deps.job_store.get(message.job_id).await? else {
            return Ok(());
        };
        if job.status.is_terminal() {
            info!(
                job_id = %job.id,
                status = %job.status,
                "job reached a terminal state during processing, discarding result"
            );
            return Ok(());
        }

        let execution_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(data) => {
                if job.complete(data, retention).is_err() {
                    return Ok(());
                }
                if matches!(self.write_or_yield(&job).await?, WriteOutcome::Yielded) {
                    return Ok(());
                }
                info!(job_id = %job.id, execution_ms, "document processed");
                self.emit_notification(&job, execution_ms).await;
                Ok(())
            }
            Err(e) if e.should_retry() => {
                // Leave the job non-terminal; queue-level redelivery retries
                // up to the tier's budget, then the DLQ is the record.
                warn!(
                    job_id = %job.id,
                    attempt = delivery.receive_count,
                    error = %e,
                    "transient processing failure, returning message for redelivery"
                );
                Err(e.into())
            }
            Err(e) => {
                if job.fail(e.to_string(), retention).is_err() {
                    return Ok(());
                }
                if matches!(self.write_or_yield(&job).await?, WriteOutcome::Yielded) {
                    return Ok(());
                }
                warn!(job_id = %job.id, error = %e, "document processing failed");
                self.emit_notification(&job, execution_ms).await;
                Ok(())
            }
        }
    }
}

/// Write partial-content snapshots as the processor reports them.
///
/// Visible progress is at-most-once: write failures are logged and skipped.
/// A terminal status observed here means the job was cancelled or finished
/// elsewhere - stop emitting.
async fn forward_partials(
    store: Arc<dyn JobStore>,
    job_id: Uuid,
    retention: std::time::Duration,
    mut partials: mpsc::Receiver<String>,
) {
    while let Some(snapshot) = partials.recv().await {
        let job = match store.get(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => break,
            Err(e) => {
                debug!(job_id = %job_id, error = %e, "snapshot skipped");
                continue;
            }
        };
        if job.status.is_terminal() {
            debug!(job_id = %job_id, status = %job.status, "job terminal, stopping progress writes");
            break;
        }

        let mut job = job;
        if job.status.can_transition_to(JobStatus::Streaming) {
            let _ = job.transition_to(JobStatus::Streaming, retention);
        }
        job.partial_content = Some(snapshot);
        job.ttl = Job::ttl_from_now(retention);

        if let Err(e) = store.update(&job).await {
            debug!(job_id = %job_id, error = %e, "partial snapshot dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::jobs::models::{ProcessingOptions, ResponseData};
    use crate::kernel::test_dependencies::{MockProcessor, TestDependencies};
    use std::time::Duration;

    async fn seeded_job(harness: &TestDependencies) -> Job {
        let mut job = Job::builder()
            .user_id(Uuid::new_v4())
            .file_name("report.pdf")
            .file_size(1024i64)
            .file_type("application/pdf")
            .notify_email("user@example.com".to_string())
            .storage_key("u/report.pdf".to_string())
            .ttl(Job::ttl_from_now(Duration::from_secs(3600)))
            .build();
        job.status = JobStatus::Processing;
        harness.deps.job_store.insert(&job).await.unwrap();
        job
    }

    async fn deliver(harness: &TestDependencies, job: &Job) -> Result<()> {
        let message = ProcessingMessage::for_job(job, "test-uploads", "u/report.pdf");
        harness.deps.queues.standard.send(&message).await.unwrap();
        let batch = harness.deps.queues.standard.receive(1).await;
        let worker = DocumentWorker::new(harness.deps.clone(), ResourceProfile::standard());
        let result = worker.handle(&batch[0]).await;
        match &result {
            Ok(()) => harness.deps.queues.standard.ack(&batch[0].receipt).await.unwrap(),
            Err(_) => harness.deps.queues.standard.nack(&batch[0].receipt).await.unwrap(),
        }
        result
    }

    #[tokio::test]
    async fn test_success_writes_result_and_notifies() {
        let harness = TestDependencies::with_processor(MockProcessor::new().with_text("X"));
        let job = seeded_job(&harness).await;

        deliver(&harness, &job).await.unwrap();

        let stored = harness.deps.job_store.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert!(matches!(
            stored.response_data,
            Some(ResponseData::Text { ref text, .. }) if text == "X"
        ));
        assert_eq!(stored.delivery_attempts, 1);
        assert_eq!(harness.deps.queues.notifications.depth().await, 1);
    }

    #[tokio::test]
    async fn test_partials_streamed_before_completion() {
        let harness = TestDependencies::with_processor(
            MockProcessor::new()
                .with_partials(vec!["He", "Hello"])
                .with_text("Hello, world"),
        );
        let job = seeded_job(&harness).await;

        deliver(&harness, &job).await.unwrap();

        let stored = harness.deps.job_store.get(job.id).await.unwrap().unwrap();
        // The job streamed, then completed; the last snapshot survives.
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.partial_content.as_deref(), Some("Hello"));
    }

    #[tokio::test]
    async fn test_redelivery_of_completed_job_is_noop() {
        let harness = TestDependencies::with_processor(MockProcessor::new().with_text("X"));
        let job = seeded_job(&harness).await;

        deliver(&harness, &job).await.unwrap();
        let first = harness.deps.job_store.get(job.id).await.unwrap().unwrap();

        // Duplicate delivery: no state change, no extra notification.
        deliver(&harness, &job).await.unwrap();
        let second = harness.deps.job_store.get(job.id).await.unwrap().unwrap();

        assert_eq!(first.status, second.status);
        assert_eq!(first.updated_at, second.updated_at);
        assert_eq!(harness.deps.queues.notifications.depth().await, 1);
        assert_eq!(harness.processor.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_fatal_failure_marks_failed_and_notifies() {
        let harness = TestDependencies::with_processor(
            MockProcessor::new().fail_fatal_for("report.pdf", "timeout"),
        );
        let job = seeded_job(&harness).await;

        deliver(&harness, &job).await.unwrap();

        let stored = harness.deps.job_store.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("timeout"));
        assert!(stored.response_data.is_none());
        assert_eq!(harness.deps.queues.notifications.depth().await, 1);
    }

    #[tokio::test]
    async fn test_retryable_failure_leaves_job_open() {
        let harness = TestDependencies::with_processor(
            MockProcessor::new().failing_retryable_times(1).with_text("ok"),
        );
        let job = seeded_job(&harness).await;

        // First delivery fails retryably; the job is not terminal.
        assert!(deliver(&harness, &job).await.is_err());
        let stored = harness.deps.job_store.get(job.id).await.unwrap().unwrap();
        assert!(!stored.status.is_terminal());
        assert_eq!(harness.deps.queues.notifications.depth().await, 0);

        // Redelivery succeeds.
        let batch = harness.deps.queues.standard.receive(1).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].receive_count, 2);
        let worker = DocumentWorker::new(harness.deps.clone(), ResourceProfile::standard());
        worker.handle(&batch[0]).await.unwrap();

        let stored = harness.deps.job_store.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.delivery_attempts, 2);
    }

    #[tokio::test]
    async fn test_cancellation_mid_processing_discards_result() {
        let harness = TestDependencies::with_processor(
            MockProcessor::new()
                .with_delay(Duration::from_millis(50))
                .with_text("too late"),
        );
        let job = seeded_job(&harness).await;

        let message = ProcessingMessage::for_job(&job, "test-uploads", "u/report.pdf");
        harness.deps.queues.standard.send(&message).await.unwrap();
        let batch = harness.deps.queues.standard.receive(1).await;

        let worker = DocumentWorker::new(harness.deps.clone(), ResourceProfile::standard());
        let handle = {
            let worker = Arc::new(worker);
            let delivery = batch.into_iter().next().unwrap();
            tokio::spawn(async move { worker.handle(&delivery).await })
        };

        // Cancel while the processor is sleeping.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let mut cancelled = harness.deps.job_store.get(job.id).await.unwrap().unwrap();
        cancelled.cancel(Duration::from_secs(3600)).unwrap();
        harness.deps.job_store.update(&cancelled).await.unwrap();

        handle.await.unwrap().unwrap();

        let stored = harness.deps.job_store.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Cancelled);
        assert!(stored.response_data.is_none());
        // No completion notification for a cancelled job.
        assert_eq!(harness.deps.queues.notifications.depth().await, 0);
    }

    #[tokio::test]
    async fn test_missing_job_record_acknowledges() {
        let harness = TestDependencies::new();
        let ghost = Job::builder()
            .user_id(Uuid::new_v4())
            .file_name("ghost.pdf")
            .file_size(10i64)
            .file_type("application/pdf")
            .processing_options(ProcessingOptions::default())
            .ttl(Job::ttl_from_now(Duration::from_secs(3600)))
            .build();

        // Never inserted into the store.
        let result = deliver(&harness, &ghost).await;
        assert!(result.is_ok());
        assert_eq!(harness.processor.calls().len(), 0);
    }
}
