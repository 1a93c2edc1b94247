//! Polling-to-stream adapter.
//!
//! Drives a single job from submission to a terminal state by repeatedly
//! polling the status endpoint, and exposes the results as an incremental,
//! cancelable [`Stream`] of [`JobUpdate`]s:
//!
//! ```text
//! submit ──► poll ──► poll ──► poll ──► terminal
//!              │        │        │
//!              ▼        ▼        ▼
//!          Partial  Partial  Completed / Failed / (silent end)
//! ```
//!
//! Each poll response carries the server's recommended interval for the
//! *next* poll, which the loop honors - server-side slow-start and backoff
//! need no client changes. Transient poll failures are retried in place
//! with exponential backoff; only exhausting `max_poll_attempts` surfaces
//! as a timeout, and that error is a different type from a job failure.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backoff::Backoff;
use crate::client::JobTransport;
use crate::error::StreamError;
use crate::types::{JobPhase, JobUpdate, ResponseData, StatusResponse};

/// Tuning for the poll loop.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Hard bound on status polls, guaranteeing termination.
    pub max_poll_attempts: u32,
    /// Timeout for a single status request, independent of the overall job.
    pub poll_timeout: Duration,
    /// Delay before the first poll (the server directs all later ones).
    pub initial_interval: Duration,
    /// Base delay for retrying failed polls.
    pub backoff_base: Duration,
    /// Cap on the retry delay.
    pub backoff_cap: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_poll_attempts: 300,
            poll_timeout: Duration::from_secs(10),
            initial_interval: Duration::from_millis(500),
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(60),
        }
    }
}

/// Client that turns job polling into update streams.
pub struct JobStreamClient<T: JobTransport> {
    transport: Arc<T>,
    config: StreamConfig,
}

impl<T: JobTransport + 'static> JobStreamClient<T> {
    /// Create a client with default configuration.
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            config: StreamConfig::default(),
        }
    }

    /// Create a client with custom configuration.
    pub fn with_config(transport: Arc<T>, config: StreamConfig) -> Self {
        Self { transport, config }
    }

    /// Submit a job and stream its updates.
    ///
    /// Fails immediately (no retry) if the server does not return a job ID.
    pub async fn submit_and_stream(
        &self,
        body: &serde_json::Value,
    ) -> Result<JobStream, StreamError> {
        let response = self.transport.submit(body).await?;
        let job_id = response.job_id.ok_or(StreamError::MissingJobId)?;
        Ok(self.stream_existing(job_id))
    }

    /// Stream updates for an already-submitted job.
    pub fn stream_existing(&self, job_id: Uuid) -> JobStream {
        let (tx, rx) = mpsc::channel(32);
        let cancel = CancellationToken::new();

        tokio::spawn(poll_loop(
            self.transport.clone(),
            job_id,
            self.config.clone(),
            tx,
            cancel.clone(),
        ));

        JobStream {
            job_id,
            cancel,
            updates: ReceiverStream::new(rx),
        }
    }
}

/// A cancelable stream of job updates.
///
/// Terminal mapping: `completed` emits one [`JobUpdate::Completed`] and
/// ends; `failed` yields the server's message as [`StreamError::Failed`];
/// `cancelled` (or a caller abort) ends the stream silently.
pub struct JobStream {
    job_id: Uuid,
    cancel: CancellationToken,
    updates: ReceiverStream<Result<JobUpdate, StreamError>>,
}

impl JobStream {
    /// The job this stream is following.
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Signal abort: the loop sends a best-effort cancel to the server and
    /// the stream ends without further updates.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    /// A token that aborts this stream when cancelled, for wiring into a
    /// caller's own cancellation tree.
    pub fn abort_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drain the stream, returning the final result and discarding partial
    /// snapshots along the way.
    pub async fn final_result(mut self) -> Result<ResponseData, StreamError> {
        let mut last_err = None;
        while let Some(update) = self.next().await {
            match update {
                Ok(JobUpdate::Completed(data)) => return Ok(data),
                Ok(JobUpdate::Partial(_)) => {}
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or(StreamError::Ended))
    }
}

impl Stream for JobStream {
    type Item = Result<JobUpdate, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().updates).poll_next(cx)
    }
}

impl Drop for JobStream {
    fn drop(&mut self) {
        // Stop the poll loop if the consumer walks away early.
        self.cancel.cancel();
    }
}

/// The single-job poll loop. Cooperatively single-threaded: the only
/// suspension points are the inter-poll sleep and the in-flight request.
async fn poll_loop<T: JobTransport>(
    transport: Arc<T>,
    job_id: Uuid,
    config: StreamConfig,
    tx: mpsc::Sender<Result<JobUpdate, StreamError>>,
    cancel: CancellationToken,
) {
    let mut attempts: u32 = 0;
    let mut backoff = Backoff::new(config.backoff_base, config.backoff_cap);
    let mut wait = config.initial_interval;
    let mut last_partial: Option<String> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                best_effort_cancel(transport.as_ref(), job_id).await;
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        if attempts >= config.max_poll_attempts {
            let _ = tx
                .send(Err(StreamError::PollBudgetExhausted { attempts }))
                .await;
            return;
        }
        attempts += 1;

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                best_effort_cancel(transport.as_ref(), job_id).await;
                return;
            }
            response = transport.poll(job_id, config.poll_timeout) => response,
        };

        let status = match response {
            Ok(status) => status,
            Err(e) => {
                // Transient: retry in place, it does not end the stream.
                wait = backoff.next_delay();
                debug!(
                    job_id = %job_id,
                    attempt = attempts,
                    error = %e,
                    retry_in_ms = wait.as_millis() as u64,
                    "status poll failed, backing off"
                );
                continue;
            }
        };
        backoff.reset();

        if let Some(partial) = status.partial_content.clone() {
            // Surface immediately; repeats of the same snapshot are skipped.
            if last_partial.as_deref() != Some(partial.as_str()) {
                last_partial = Some(partial.clone());
                if tx.send(Ok(JobUpdate::Partial(partial))).await.is_err() {
                    return;
                }
            }
        }

        match terminal_outcome(&status) {
            Outcome::Continue => {
                if !status.should_continue_polling {
                    let _ = tx.send(Err(StreamError::Ended)).await;
                    return;
                }
                wait = Duration::from_millis(status.polling_interval.max(1));
            }
            Outcome::Finish(item) => {
                if let Some(item) = item {
                    let _ = tx.send(item).await;
                }
                return;
            }
        }
    }
}

enum Outcome {
    Continue,
    /// Stream ends; `None` means silently (cancelled).
    Finish(Option<Result<JobUpdate, StreamError>>),
}

fn terminal_outcome(status: &StatusResponse) -> Outcome {
    match status.status {
        JobPhase::Completed => match &status.response_data {
            Some(data) => Outcome::Finish(Some(Ok(JobUpdate::Completed(data.clone())))),
            None => Outcome::Finish(Some(Err(StreamError::Transport(
                "completed status carried no response data".into(),
            )))),
        },
        JobPhase::Failed => {
            let message = status
                .error_message
                .clone()
                .unwrap_or_else(|| "processing failed".to_string());
            Outcome::Finish(Some(Err(StreamError::Failed { message })))
        }
        JobPhase::Cancelled => Outcome::Finish(None),
        _ => Outcome::Continue,
    }
}

async fn best_effort_cancel<T: JobTransport>(transport: &T, job_id: Uuid) {
    if let Err(e) = transport.cancel(job_id).await {
        // Best-effort only: logged, never raised to the consumer.
        warn!(job_id = %job_id, error = %e, "best-effort cancel failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubmitResponse;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tokio::sync::Mutex;

    /// Transport that replays a script of poll results. When the script is
    /// exhausted, the last entry repeats.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<StatusResponse, StreamError>>>,
        repeat: Mutex<Option<Result<StatusResponse, StreamError>>>,
        polls: AtomicU32,
        cancelled: AtomicBool,
        job_id: Option<Uuid>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<StatusResponse, StreamError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                repeat: Mutex::new(None),
                polls: AtomicU32::new(0),
                cancelled: AtomicBool::new(false),
                job_id: Some(Uuid::new_v4()),
            }
        }
    }

    #[async_trait]
    impl JobTransport for ScriptedTransport {
        async fn submit(&self, _body: &serde_json::Value) -> Result<SubmitResponse, StreamError> {
            Ok(SubmitResponse {
                job_id: self.job_id,
                request_id: Some("req-test".into()),
            })
        }

        async fn poll(
            &self,
            _job_id: Uuid,
            _timeout: Duration,
        ) -> Result<StatusResponse, StreamError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().await;
            match script.pop_front() {
                Some(entry) => {
                    if script.is_empty() {
                        *self.repeat.lock().await = Some(entry.clone());
                    }
                    entry
                }
                None => self
                    .repeat
                    .lock()
                    .await
                    .clone()
                    .unwrap_or(Err(StreamError::Transport("script exhausted".into()))),
            }
        }

        async fn cancel(&self, _job_id: Uuid) -> Result<(), StreamError> {
            self.cancelled.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn response(status: JobPhase) -> StatusResponse {
        StatusResponse {
            job_id: Uuid::nil(),
            conversation_id: None,
            status,
            partial_content: None,
            response_data: None,
            error_message: None,
            polling_interval: 1,
            should_continue_polling: true,
            request_id: "req".into(),
        }
    }

    fn fast_config() -> StreamConfig {
        StreamConfig {
            max_poll_attempts: 50,
            poll_timeout: Duration::from_millis(100),
            initial_interval: Duration::from_millis(1),
            backoff_base: Duration::from_millis(1),
            backoff_cap: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_partials_then_completed() {
        let mut streaming_a = response(JobPhase::Streaming);
        streaming_a.partial_content = Some("Hel".into());
        let mut streaming_b = response(JobPhase::Streaming);
        streaming_b.partial_content = Some("Hello".into());
        let mut completed = response(JobPhase::Completed);
        completed.response_data = Some(ResponseData::Text {
            text: "Hello, world".into(),
            usage: None,
        });

        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(response(JobPhase::Processing)),
            Ok(streaming_a),
            Ok(streaming_b),
            Ok(completed),
        ]));
        let client = JobStreamClient::with_config(transport, fast_config());
        let stream = client
            .submit_and_stream(&serde_json::json!({}))
            .await
            .unwrap();

        let updates: Vec<_> = stream.collect().await;
        assert_eq!(updates.len(), 3);
        assert_eq!(
            updates[0].as_ref().unwrap(),
            &JobUpdate::Partial("Hel".into())
        );
        assert_eq!(
            updates[1].as_ref().unwrap(),
            &JobUpdate::Partial("Hello".into())
        );
        assert!(matches!(
            updates[2].as_ref().unwrap(),
            JobUpdate::Completed(ResponseData::Text { text, .. }) if text == "Hello, world"
        ));
    }

    #[tokio::test]
    async fn test_repeated_snapshot_emitted_once() {
        let mut snap = response(JobPhase::Streaming);
        snap.partial_content = Some("same".into());
        let mut completed = response(JobPhase::Completed);
        completed.response_data = Some(ResponseData::Text {
            text: "same".into(),
            usage: None,
        });

        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(snap.clone()),
            Ok(snap),
            Ok(completed),
        ]));
        let client = JobStreamClient::with_config(transport, fast_config());
        let updates: Vec<_> = client
            .submit_and_stream(&serde_json::json!({}))
            .await
            .unwrap()
            .collect()
            .await;

        let partials = updates
            .iter()
            .filter(|u| matches!(u, Ok(JobUpdate::Partial(_))))
            .count();
        assert_eq!(partials, 1);
    }

    #[tokio::test]
    async fn test_failed_surfaces_server_message() {
        let mut failed = response(JobPhase::Failed);
        failed.error_message = Some("timeout".into());

        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(response(JobPhase::Processing)),
            Ok(failed),
        ]));
        let client = JobStreamClient::with_config(transport, fast_config());
        let result = client
            .submit_and_stream(&serde_json::json!({}))
            .await
            .unwrap()
            .final_result()
            .await;

        match result {
            Err(StreamError::Failed { message }) => assert_eq!(message, "timeout"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transient_errors_retried_in_place() {
        let mut completed = response(JobPhase::Completed);
        completed.response_data = Some(ResponseData::Text {
            text: "ok".into(),
            usage: None,
        });

        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(StreamError::Transport("connection reset".into())),
            Err(StreamError::Transport("connection reset".into())),
            Ok(completed),
        ]));
        let client = JobStreamClient::with_config(transport.clone(), fast_config());
        let result = client
            .submit_and_stream(&serde_json::json!({}))
            .await
            .unwrap()
            .final_result()
            .await;

        assert!(result.is_ok());
        assert_eq!(transport.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_poll_budget_exhausted() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(response(
            JobPhase::Processing,
        ))]));
        let mut config = fast_config();
        config.max_poll_attempts = 5;

        let client = JobStreamClient::with_config(transport.clone(), config);
        let result = client
            .submit_and_stream(&serde_json::json!({}))
            .await
            .unwrap()
            .final_result()
            .await;

        match result {
            Err(StreamError::PollBudgetExhausted { attempts }) => assert_eq!(attempts, 5),
            other => panic!("expected PollBudgetExhausted, got {other:?}"),
        }
        assert_eq!(transport.polls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_abort_sends_best_effort_cancel_and_ends_silently() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(response(
            JobPhase::Processing,
        ))]));
        let client = JobStreamClient::with_config(transport.clone(), fast_config());
        let mut stream = client
            .submit_and_stream(&serde_json::json!({}))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        stream.abort();

        // No further updates, no error, just end-of-stream.
        assert!(stream.next().await.is_none());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(transport.cancelled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancelled_job_ends_silently() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(response(JobPhase::Processing)),
            Ok(response(JobPhase::Cancelled)),
        ]));
        let client = JobStreamClient::with_config(transport, fast_config());
        let updates: Vec<_> = client
            .submit_and_stream(&serde_json::json!({}))
            .await
            .unwrap()
            .collect()
            .await;
        assert!(updates.is_empty());
    }

    #[tokio::test]
    async fn test_missing_job_id_fails_fast() {
        struct NoIdTransport;

        #[async_trait]
        impl JobTransport for NoIdTransport {
            async fn submit(
                &self,
                _body: &serde_json::Value,
            ) -> Result<SubmitResponse, StreamError> {
                Ok(SubmitResponse {
                    job_id: None,
                    request_id: None,
                })
            }
            async fn poll(
                &self,
                _job_id: Uuid,
                _timeout: Duration,
            ) -> Result<StatusResponse, StreamError> {
                unreachable!("poll must not be called without a job id")
            }
            async fn cancel(&self, _job_id: Uuid) -> Result<(), StreamError> {
                Ok(())
            }
        }

        let client = JobStreamClient::new(Arc::new(NoIdTransport));
        let result = client.submit_and_stream(&serde_json::json!({})).await;
        assert!(matches!(result, Err(StreamError::MissingJobId)));
    }

    #[tokio::test]
    async fn test_server_directed_interval_is_honored() {
        let mut slow = response(JobPhase::Processing);
        slow.polling_interval = 40;
        let mut completed = response(JobPhase::Completed);
        completed.response_data = Some(ResponseData::Text {
            text: "ok".into(),
            usage: None,
        });

        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(slow.clone()),
            Ok(slow),
            Ok(completed),
        ]));
        let client = JobStreamClient::with_config(transport, fast_config());

        let started = std::time::Instant::now();
        let result = client
            .submit_and_stream(&serde_json::json!({}))
            .await
            .unwrap()
            .final_result()
            .await;
        assert!(result.is_ok());

        // Two 40ms server-directed waits must have elapsed.
        assert!(started.elapsed() >= Duration::from_millis(80));
    }
}
