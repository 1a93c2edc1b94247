//! End-to-end pipeline harness.
//!
//! Boots the whole pipeline in process: the HTTP API on an ephemeral port,
//! both worker tiers, the notification dispatcher, and the expiry sweep -
//! all against in-memory dependencies. Tests drive it over real HTTP, with
//! the docstream adapter as the polling client.

use std::future::Future;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use docstream::{HttpTransport, JobStreamClient, StreamConfig};
use server_core::kernel::test_dependencies::{MockProcessor, TestDependencies};
use server_core::server::app::{build_app, spawn_pipeline};

pub struct PipelineHarness {
    pub td: TestDependencies,
    pub base_url: String,
    pub user_id: Uuid,
    pub client: reqwest::Client,
    shutdown: CancellationToken,
}

impl PipelineHarness {
    /// Boot the full pipeline (workers included).
    pub async fn start(processor: MockProcessor) -> Self {
        Self::start_with_workers(processor, true).await
    }

    /// Boot the HTTP surface, optionally without background consumers so a
    /// test can observe queue contents before they are drained.
    pub async fn start_with_workers(processor: MockProcessor, spawn_workers: bool) -> Self {
        let td = TestDependencies::with_processor(processor);
        let shutdown = CancellationToken::new();

        if spawn_workers {
            spawn_pipeline(td.deps.clone(), shutdown.clone());
        }

        let app = build_app(td.deps.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");

        let token = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
                .expect("server run");
        });

        Self {
            td,
            base_url: format!("http://{addr}"),
            user_id: Uuid::new_v4(),
            client: reqwest::Client::new(),
            shutdown,
        }
    }

    /// Initiate and complete a single-part upload; returns the job ID.
    pub async fn upload(&self, file_name: &str, file_size: i64, notify: Option<&str>) -> Uuid {
        let response = self
            .client
            .post(format!("{}/api/uploads", self.base_url))
            .header("x-user-id", self.user_id.to_string())
            .json(&json!({
                "fileName": file_name,
                "fileSize": file_size,
                "fileType": "application/pdf",
                "notifyEmail": notify,
                "partCount": 1,
            }))
            .send()
            .await
            .expect("initiate request");
        assert!(
            response.status().is_success(),
            "initiate failed: {}",
            response.status()
        );
        let body: serde_json::Value = response.json().await.expect("initiate body");
        let job_id: Uuid = body["jobId"].as_str().unwrap().parse().unwrap();
        let upload_id = body["uploadId"].as_str().unwrap().to_string();
        assert!(!body["partUrls"].as_array().unwrap().is_empty());

        let response = self
            .client
            .post(format!("{}/api/uploads/complete", self.base_url))
            .header("x-user-id", self.user_id.to_string())
            .json(&json!({
                "jobId": job_id,
                "uploadId": upload_id,
                "parts": [{ "ETag": "etag-1", "PartNumber": 1 }],
            }))
            .send()
            .await
            .expect("complete request");
        assert!(
            response.status().is_success(),
            "complete failed: {}",
            response.status()
        );

        job_id
    }

    /// Polling client wired to this server with the caller's identity and a
    /// test-friendly pace.
    pub fn stream_client(&self) -> JobStreamClient<HttpTransport> {
        let transport = HttpTransport::new(self.base_url.clone())
            .with_header("x-user-id", self.user_id.to_string());
        JobStreamClient::with_config(
            std::sync::Arc::new(transport),
            StreamConfig {
                max_poll_attempts: 200,
                poll_timeout: Duration::from_secs(2),
                initial_interval: Duration::from_millis(20),
                backoff_base: Duration::from_millis(20),
                backoff_cap: Duration::from_millis(200),
            },
        )
    }

    /// Poll until `condition` holds or `timeout` elapses.
    pub async fn wait_for<F, Fut>(&self, mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if condition().await {
                return true;
            }
            if std::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for PipelineHarness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
