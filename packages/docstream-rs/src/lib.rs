//! # Docstream
//!
//! Client-side adapter that converts repeated job-status polling into an
//! incremental, cancelable stream of updates.
//!
//! ## Core pieces
//!
//! - [`JobTransport`] - the server operations the adapter needs (submit,
//!   poll, cancel), with [`HttpTransport`] as the reqwest implementation.
//! - [`JobStreamClient`] - submits a job and returns a [`JobStream`].
//! - [`JobStream`] - a `futures::Stream` of [`JobUpdate`]s: partial-content
//!   snapshots as they appear, then exactly one final result.
//! - [`Backoff`] - explicit reconnect state with jittered exponential
//!   delays, pure enough to unit-test without timers.
//!
//! ## Guarantees
//!
//! - Server-directed pacing: each status response's `pollingInterval` is
//!   honored for the next poll.
//! - Bounded: at most `max_poll_attempts` polls, then a timeout error that
//!   is never conflated with a job failure.
//! - Cancelable: aborting sends a best-effort cancel to the server and ends
//!   the stream without further updates.
//!
//! ## Example
//!
//! ```ignore
//! let transport = Arc::new(HttpTransport::new("https://api.example.com"));
//! let client = JobStreamClient::new(transport);
//!
//! let mut stream = client.submit_and_stream(&request).await?;
//! while let Some(update) = stream.next().await {
//!     match update? {
//!         JobUpdate::Partial(text) => render_partial(&text),
//!         JobUpdate::Completed(data) => render_final(data),
//!     }
//! }
//! ```

pub mod backoff;
pub mod client;
pub mod error;
pub mod stream;
pub mod types;

pub use backoff::Backoff;
pub use client::{HttpTransport, JobTransport};
pub use error::StreamError;
pub use stream::{JobStream, JobStreamClient, StreamConfig};
pub use types::{JobPhase, JobUpdate, ResponseData, StatusResponse, SubmitResponse, UsageMetadata};
