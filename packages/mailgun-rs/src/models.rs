use serde::Deserialize;

/// Response from the Mailgun messages endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageResponse {
    /// Provider-assigned message ID, e.g. `<20260806...@mg.example.com>`.
    pub id: String,
    /// Human-readable status message.
    pub message: String,
}
