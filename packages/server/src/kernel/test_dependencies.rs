// TestDependencies - mock implementations for testing
//
// Provides mock services that can be injected into ServerDeps for tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::domains::jobs::models::ResponseData;
use crate::kernel::object_store::InMemoryObjectStore;
use crate::kernel::traits::{
    BaseDocumentProcessor, BaseMailer, BaseObjectStore, MultipartInit, ProcessorError,
    ProcessorInput, RenderedEmail, UploadPart,
};

// =============================================================================
// Mock Object Store
// =============================================================================

/// In-memory object store with transient-failure injection.
pub struct MockObjectStore {
    inner: InMemoryObjectStore,
    fail_completions: AtomicU32,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryObjectStore::new(),
            fail_completions: AtomicU32::new(0),
        }
    }

    /// Make the next `n` completion calls fail transiently.
    pub fn fail_next_completions(&self, n: u32) {
        self.fail_completions.store(n, Ordering::SeqCst);
    }

    /// Whether a finalized object exists.
    pub fn object_exists(&self, bucket: &str, key: &str) -> bool {
        self.inner.object_exists(bucket, key)
    }
}

impl Default for MockObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseObjectStore for MockObjectStore {
    async fn initiate_multipart(
        &self,
        bucket: &str,
        key: &str,
        part_count: u32,
    ) -> Result<MultipartInit> {
        self.inner.initiate_multipart(bucket, key, part_count).await
    }

    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[UploadPart],
    ) -> Result<String> {
        let remaining = self.fail_completions.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_completions.store(remaining - 1, Ordering::SeqCst);
            bail!("store temporarily unavailable");
        }
        self.inner
            .complete_multipart(bucket, key, upload_id, parts)
            .await
    }

    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        self.inner.abort_multipart(bucket, key, upload_id).await
    }
}

// =============================================================================
// Mock Mailer
// =============================================================================

pub struct MockMailer {
    sent: Mutex<Vec<RenderedEmail>>,
    failing: AtomicU32,
    attempts: AtomicU32,
}

impl MockMailer {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
        }
    }

    /// Make the next `n` sends fail (use `u32::MAX` for always).
    pub fn failing_times(self, n: u32) -> Self {
        self.failing.store(n, Ordering::SeqCst);
        self
    }

    /// Same as [`failing_times`](Self::failing_times), after construction.
    pub fn fail_next_sends(&self, n: u32) {
        self.failing.store(n, Ordering::SeqCst);
    }

    /// Emails successfully "sent".
    pub fn sent(&self) -> Vec<RenderedEmail> {
        self.sent.lock().unwrap().clone()
    }

    /// Total send calls, including failures.
    pub fn send_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Default for MockMailer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseMailer for MockMailer {
    async fn send(&self, email: &RenderedEmail) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let remaining = self.failing.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != u32::MAX {
                self.failing.store(remaining - 1, Ordering::SeqCst);
            }
            bail!("provider rejected the message");
        }

        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

// =============================================================================
// Mock Processor
// =============================================================================

/// Scripted stand-in for the opaque extraction engine.
pub struct MockProcessor {
    /// Snapshots pushed before the final result.
    partials: Vec<String>,
    /// Text returned on success.
    text: String,
    /// Per-file fatal failures: file_name -> error message.
    fatal_failures: DashMap<String, String>,
    /// Fail retryably this many times before succeeding.
    retryable_failures: AtomicU32,
    /// Captured inputs, in call order.
    calls: Mutex<Vec<ProcessorInput>>,
    /// Optional artificial processing delay.
    delay: Option<Duration>,
}

impl MockProcessor {
    pub fn new() -> Self {
        Self {
            partials: Vec::new(),
            text: "processed".to_string(),
            fatal_failures: DashMap::new(),
            retryable_failures: AtomicU32::new(0),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Set the success payload text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Push these snapshots before completing.
    pub fn with_partials(mut self, partials: Vec<&str>) -> Self {
        self.partials = partials.into_iter().map(String::from).collect();
        self
    }

    /// Fail fatally whenever this file is processed.
    pub fn fail_fatal_for(self, file_name: &str, message: &str) -> Self {
        self.fatal_failures
            .insert(file_name.to_string(), message.to_string());
        self
    }

    /// Fail retryably for the first `n` calls.
    pub fn failing_retryable_times(self, n: u32) -> Self {
        self.retryable_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Delay each run, to let tests observe in-flight state.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Inputs this processor has seen.
    pub fn calls(&self) -> Vec<ProcessorInput> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockProcessor {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

/// Fully wired in-memory dependency set for tests.
pub struct TestDependencies {
    pub deps: std::sync::Arc<crate::kernel::deps::ServerDeps>,
    pub object_store: std::sync::Arc<MockObjectStore>,
    pub mailer: std::sync::Arc<MockMailer>,
    pub processor: std::sync::Arc<MockProcessor>,
    pub job_store: std::sync::Arc<crate::domains::jobs::store::InMemoryJobStore>,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self::with_processor(MockProcessor::new())
    }

    pub fn with_processor(processor: MockProcessor) -> Self {
        use crate::domains::notifications::templates::NotificationLinks;
        use crate::domains::processing::router::ProcessingQueues;
        use std::sync::Arc;

        let object_store = Arc::new(MockObjectStore::new());
        let mailer = Arc::new(MockMailer::new());
        let processor = Arc::new(processor);
        let job_store = Arc::new(crate::domains::jobs::store::InMemoryJobStore::new());

        let deps = Arc::new(crate::kernel::deps::ServerDeps {
            job_store: job_store.clone(),
            object_store: object_store.clone(),
            mailer: mailer.clone(),
            processor: processor.clone(),
            queues: Arc::new(ProcessingQueues::with_defaults()),
            upload_bucket: "test-uploads".to_string(),
            large_file_threshold: 50 * 1024 * 1024,
            job_retention: Duration::from_secs(3600),
            notification_links: NotificationLinks::from_base_url("https://app.test"),
            admin_user_ids: Vec::new(),
        });

        Self {
            deps,
            object_store,
            mailer,
            processor,
            job_store,
        }
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseDocumentProcessor for MockProcessor {
    async fn process(
        &self,
        input: ProcessorInput,
        partials: mpsc::Sender<String>,
    ) -> Result<ResponseData, ProcessorError> {
        self.calls.lock().unwrap().push(input.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let remaining = self.retryable_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.retryable_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ProcessorError::retryable("resource pressure, try again"));
        }

        if let Some(message) = self.fatal_failures.get(&input.file_name) {
            return Err(ProcessorError::fatal(message.value().clone()));
        }

        for snapshot in &self.partials {
            // A closed channel means nobody is watching progress; that is
            // not a processing failure.
            let _ = partials.send(snapshot.clone()).await;
        }

        Ok(ResponseData::Text {
            text: self.text.clone(),
            usage: None,
        })
    }
}
