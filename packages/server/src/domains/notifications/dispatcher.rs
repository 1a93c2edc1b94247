//! Notification dispatcher.
//!
//! Consumes completion events from the notification queue, renders the
//! email, and sends it through the provider. Failed sends are nacked and
//! redelivered up to the queue's receive budget (3), after which the
//! message lands in the notification DLQ. Delivery is at-least-once;
//! recipients must tolerate the occasional duplicate, so no application
//! level deduplication is attempted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use conveyor::{BatchConsumer, ConsumerConfig, Delivery, MessageHandler, Queue};
use tracing::{info, warn};

use super::models::Notification;
use super::templates::render_notification;
use crate::kernel::traits::BaseMailer;

/// Handler that renders and sends one notification per message.
pub struct NotificationDispatcher {
    mailer: Arc<dyn BaseMailer>,
}

impl NotificationDispatcher {
    pub fn new(mailer: Arc<dyn BaseMailer>) -> Self {
        Self { mailer }
    }

    /// Consumer wiring: small batches, a short coalescing window, modest
    /// concurrency.
    pub fn consumer(self, queue: Arc<Queue>) -> BatchConsumer {
        BatchConsumer::with_config(
            queue,
            Arc::new(self),
            ConsumerConfig {
                batch_size: 5,
                max_concurrency: 2,
                poll_interval: Duration::from_secs(5),
                batch_window: Some(Duration::from_millis(500)),
            },
        )
    }
}

#[async_trait]
impl MessageHandler for NotificationDispatcher {
    async fn handle(&self, delivery: &Delivery) -> Result<()> {
        let notification: Notification = delivery
            .deserialize()
            .context("notification payload did not deserialize")?;

        let email = render_notification(&notification.recipient, &notification.fields);

        if delivery.receive_count > 1 {
            warn!(
                job_id = %notification.job_id,
                attempt = delivery.receive_count,
                "retrying notification delivery"
            );
        }

        self.mailer
            .send(&email)
            .await
            .context("email provider send failed")?;

        info!(
            job_id = %notification.job_id,
            recipient = %notification.recipient,
            status = %notification.fields.status,
            "notification sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::jobs::models::{Job, JobStatus};
    use crate::domains::notifications::templates::NotificationLinks;
    use crate::kernel::test_dependencies::MockMailer;
    use conveyor::QueueConfig;
    use uuid::Uuid;

    fn notification() -> Notification {
        let mut job = Job::builder()
            .user_id(Uuid::new_v4())
            .file_name("report.pdf")
            .file_size(100i64)
            .file_type("application/pdf")
            .notify_email("user@example.com".to_string())
            .ttl(Job::ttl_from_now(Duration::from_secs(3600)))
            .build();
        job.status = JobStatus::Completed;
        Notification::for_job(
            &job,
            &NotificationLinks::from_base_url("https://app.example.com"),
            100,
        )
        .unwrap()
    }

    fn notification_queues() -> (Arc<Queue>, Arc<Queue>) {
        let dlq = Arc::new(Queue::new(QueueConfig::new("notifications-dlq")));
        let queue = Arc::new(
            Queue::new(
                QueueConfig::new("notifications")
                    .with_visibility_timeout(Duration::from_millis(50))
                    .with_max_receive_count(3),
            )
            .with_dead_letter(dlq.clone()),
        );
        (queue, dlq)
    }

    #[tokio::test]
    async fn test_successful_send_acks() {
        let (queue, dlq) = notification_queues();
        queue.send(&notification()).await.unwrap();

        let mailer = Arc::new(MockMailer::new());
        let dispatcher = NotificationDispatcher::new(mailer.clone());
        let consumer = dispatcher.consumer(queue.clone());

        let batch = queue.receive(10).await;
        let report = consumer.process_batch(batch).await;
        assert_eq!(report.succeeded, 1);

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "user@example.com");
        assert_eq!(queue.depth().await, 0);
        assert_eq!(dlq.depth().await, 0);
    }

    #[tokio::test]
    async fn test_three_failures_land_in_dlq_and_stop() {
        let (queue, dlq) = notification_queues();
        queue.send(&notification()).await.unwrap();

        let mailer = Arc::new(MockMailer::new().failing_times(u32::MAX));
        let dispatcher = NotificationDispatcher::new(mailer.clone());
        let consumer = dispatcher.consumer(queue.clone());

        // maxReceiveCount = 3: three delivery attempts fail...
        for attempt in 1..=3 {
            let batch = queue.receive(10).await;
            assert_eq!(batch.len(), 1, "attempt {attempt} should be delivered");
            let report = consumer.process_batch(batch).await;
            assert_eq!(report.failed, 1);
        }

        // ...and there is no fourth: the message is now in the DLQ.
        assert!(queue.receive(10).await.is_empty());
        assert_eq!(dlq.depth().await, 1);
        assert_eq!(mailer.send_attempts(), 3);
    }
}
