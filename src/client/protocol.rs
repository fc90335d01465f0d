//! Wire payloads for the generation service
//!
//! Requests are `POST <base-url>/api/generate` with a JSON body of
//! `{"prompt": "..."}`; successful responses carry `{"love_message": "..."}`.

use serde::{Deserialize, Serialize};

/// Path of the generation endpoint, relative to the service base URL
pub const GENERATE_PATH: &str = "/api/generate";

/// Body of an outbound generation request.
///
/// Serialize-only: the only constructor is [`RequestPayload::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestPayload {
    /// The user's prompt, never blank
    pub prompt: String,
}

impl RequestPayload {
    /// Build a payload from resolved input text.
    ///
    /// Returns `None` when the text is empty after trimming whitespace, so a
    /// blank submission can never reach the network.
    pub fn new(prompt: impl Into<String>) -> Option<Self> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            None
        } else {
            Some(Self { prompt })
        }
    }
}

/// Body of a successful generation response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsePayload {
    /// Generated text
    #[serde(rename = "love_message")]
    pub message: String,
}

/// Raw outcome of a single HTTP exchange, before retry classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as text
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 429 Too Many Requests
    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }
}
