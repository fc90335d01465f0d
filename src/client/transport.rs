//! HTTP transport for the generation endpoint
//!
//! The transport performs exactly one exchange per call and never retries;
//! classification and backoff live in [`super::RetryingRequestClient`].

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::error::TransportError;
use super::protocol::{RawResponse, RequestPayload, GENERATE_PATH};

/// A single request/response exchange with the generation service
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request. `Err` means the exchange itself failed (no status
    /// was received); any HTTP status, including errors, is `Ok`.
    async fn send(&self, payload: &RequestPayload) -> Result<RawResponse, TransportError>;
}

/// `reqwest`-backed transport posting JSON to `<base-url>/api/generate`
pub struct HttpTransport {
    http: reqwest::Client,
    url: String,
}

impl HttpTransport {
    /// Create a transport for the given base URL with a per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;

        Ok(Self {
            http,
            url: endpoint_url(base_url),
        })
    }

    /// Full URL requests are posted to
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, payload: &RequestPayload) -> Result<RawResponse, TransportError> {
        let res = self.http.post(&self.url).json(payload).send().await?;

        let status = res.status().as_u16();
        let body = res.text().await?;
        debug!(status, len = body.len(), "response received");

        Ok(RawResponse::new(status, body))
    }
}

fn endpoint_url(base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), GENERATE_PATH)
}
