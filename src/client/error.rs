//! Error taxonomy for the request client

/// Failure of a single transport-level exchange.
///
/// Every variant is retryable from the client's point of view.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    #[error("malformed response body: {0}")]
    Decode(String),

    #[error("transport error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// Terminal outcome of a logical request, after retries
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Any non-2xx status other than 429; never retried
    #[error("service returned status {status}: {body}")]
    ServerError { status: u16, body: String },

    /// Transport failure on the final attempt
    #[error("network error after {attempts} attempts: {source}")]
    Network {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// Every attempt was rate limited, or the attempt budget was zero
    #[error("request failed after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

impl ClientError {
    /// Short machine-readable kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::ServerError { .. } => "server_error",
            ClientError::Network { .. } => "network_error",
            ClientError::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}
