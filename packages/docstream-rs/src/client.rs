//! Transport abstraction and the HTTP implementation.
//!
//! The poll loop talks to a [`JobTransport`] trait rather than to reqwest
//! directly, so the stream machinery is testable with a scripted transport
//! and reusable against non-HTTP backends.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use uuid::Uuid;

use crate::error::StreamError;
use crate::types::{StatusResponse, SubmitResponse};

/// Server operations the adapter needs.
#[async_trait]
pub trait JobTransport: Send + Sync {
    /// Post the initial request and obtain a job ID.
    async fn submit(&self, body: &serde_json::Value) -> Result<SubmitResponse, StreamError>;

    /// Fetch the job's current status. `timeout` bounds this single request,
    /// independent of the overall job and of the caller's abort signal.
    async fn poll(&self, job_id: Uuid, timeout: Duration) -> Result<StatusResponse, StreamError>;

    /// Best-effort cancellation of the job.
    async fn cancel(&self, job_id: Uuid) -> Result<(), StreamError>;
}

/// HTTP transport against the pipeline's REST API.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
    headers: Vec<(String, String)>,
}

impl HttpTransport {
    /// Create a transport for the given base URL (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            auth_token: None,
            headers: Vec::new(),
        }
    }

    /// Attach a bearer token sent with every request.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Attach a custom header sent with every request (e.g. a gateway
    /// identity header).
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut request = match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        request
    }
}

#[async_trait]
impl JobTransport for HttpTransport {
    async fn submit(&self, body: &serde_json::Value) -> Result<SubmitResponse, StreamError> {
        let url = format!("{}/api/jobs", self.base_url);
        let response = self
            .authorize(self.client.post(&url).json(body))
            .send()
            .await
            .map_err(|e| StreamError::Submit(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::Submit(format!("{status}: {body}")));
        }

        response
            .json::<SubmitResponse>()
            .await
            .map_err(|e| StreamError::Submit(e.to_string()))
    }

    async fn poll(&self, job_id: Uuid, timeout: Duration) -> Result<StatusResponse, StreamError> {
        let url = format!("{}/api/jobs/{}", self.base_url, job_id);
        let response = self
            .authorize(self.client.get(&url).timeout(timeout))
            .send()
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::Transport(format!("{status}: {body}")));
        }

        response
            .json::<StatusResponse>()
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))
    }

    async fn cancel(&self, job_id: Uuid) -> Result<(), StreamError> {
        let url = format!("{}/api/jobs/{}/cancel", self.base_url, job_id);
        self.authorize(self.client.post(&url))
            .send()
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| StreamError::Transport(e.to_string()))?;
        Ok(())
    }
}
