//! Client for the remote text-generation service
//!
//! Provides the wire payloads, a `reqwest` transport and the retrying
//! client that applies exponential backoff with jitter.

mod error;
mod protocol;
mod retry;
mod transport;

pub use error::ClientError;
pub use protocol::RequestPayload;
pub use retry::{RetryingRequestClient, DEFAULT_MAX_RETRIES};
pub use transport::HttpTransport;

#[cfg(test)]
pub(crate) use retry::tests::ScriptedTransport;
