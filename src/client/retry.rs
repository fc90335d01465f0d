//! Retrying request client
//!
//! Turns rate limiting and transport failures into bounded, backed-off
//! retries. Only 429 and transport-level failures are retried; every other
//! non-2xx status is terminal on the first occurrence.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use super::error::{ClientError, TransportError};
use super::protocol::{RawResponse, RequestPayload, ResponsePayload};
use super::transport::Transport;

/// Default number of attempts per logical request
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Exponential backoff with uniform jitter: `2^i * base + U[0, jitter)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay unit doubled per attempt
    pub base: Duration,
    /// Upper bound (exclusive) of the random component
    pub jitter: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            jitter: Duration::from_millis(1000),
        }
    }
}

impl Backoff {
    /// Delay before retrying after a failure at zero-based `attempt`,
    /// in whole milliseconds
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis() as u64;
        let jitter_ms = self.jitter.as_millis() as u64;

        let exp_ms = 2u64.saturating_pow(attempt).saturating_mul(base_ms);
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..jitter_ms)
        };

        Duration::from_millis(exp_ms.saturating_add(jitter))
    }
}

/// Client sending one logical request with retries
pub struct RetryingRequestClient {
    transport: Arc<dyn Transport>,
    max_retries: u32,
    backoff: Backoff,
}

impl RetryingRequestClient {
    /// Create a client with the default backoff
    pub fn new(transport: Arc<dyn Transport>, max_retries: u32) -> Self {
        Self {
            transport,
            max_retries,
            backoff: Backoff::default(),
        }
    }

    /// Send a request, retrying on 429 and transport failures.
    ///
    /// Runs to a terminal outcome; there is no cancellation.
    pub async fn send(&self, payload: &RequestPayload) -> Result<ResponsePayload, ClientError> {
        for attempt in 0..self.max_retries {
            let is_last = attempt + 1 == self.max_retries;
            debug!(attempt = attempt + 1, max = self.max_retries, "sending request");

            let failure = match self.transport.send(payload).await {
                Ok(response) if response.is_success() => match decode(&response) {
                    Ok(parsed) => {
                        info!(attempt = attempt + 1, "request succeeded");
                        return Ok(parsed);
                    }
                    Err(e) => e,
                },
                Ok(response) if response.is_rate_limited() => {
                    // Backs off even after the final attempt
                    let delay = self.backoff.delay_for(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "rate limit hit, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Ok(response) => {
                    warn!(status = response.status, "request rejected by service");
                    return Err(ClientError::ServerError {
                        status: response.status,
                        body: response.body,
                    });
                }
                Err(e) => e,
            };

            if is_last {
                warn!(attempt = attempt + 1, error = %failure, "final attempt failed");
                return Err(ClientError::Network {
                    attempts: self.max_retries,
                    source: failure,
                });
            }

            let delay = self.backoff.delay_for(attempt);
            warn!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "request attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }

        warn!(attempts = self.max_retries, "retries exhausted");
        Err(ClientError::RetriesExhausted {
            attempts: self.max_retries,
        })
    }
}

fn decode(response: &RawResponse) -> Result<ResponsePayload, TransportError> {
    serde_json::from_str(&response.body).map_err(|e| TransportError::Decode(e.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::time::Instant;
    use tokio_test::{assert_err, assert_ok};

    /// Transport replaying a script of outcomes; repeats the last one when
    /// the script runs out
    pub(crate) struct ScriptedTransport {
        script: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
        last: Mutex<Option<Result<RawResponse, TransportError>>>,
        pub(crate) attempts: AtomicU32,
        sent_at: Mutex<Vec<Instant>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(script: Vec<Result<RawResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
                attempts: AtomicU32::new(0),
                sent_at: Mutex::new(Vec::new()),
            })
        }

        /// Time between consecutive attempts
        pub(crate) fn gaps(&self) -> Vec<Duration> {
            self.sent_at
                .lock()
                .unwrap()
                .windows(2)
                .map(|pair| pair[1] - pair[0])
                .collect()
        }

        pub(crate) fn always(outcome: Result<RawResponse, TransportError>) -> Arc<Self> {
            Self::new(vec![outcome])
        }

        pub(crate) fn ok(message: &str) -> Result<RawResponse, TransportError> {
            let body = serde_json::json!({ "love_message": message }).to_string();
            Ok(RawResponse::new(200, body))
        }

        pub(crate) fn status(status: u16) -> Result<RawResponse, TransportError> {
            Ok(RawResponse::new(status, "error"))
        }

        pub(crate) fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, _payload: &RequestPayload) -> Result<RawResponse, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.sent_at.lock().unwrap().push(Instant::now());
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(outcome) => {
                    *self.last.lock().unwrap() = Some(outcome.clone());
                    outcome
                }
                None => self
                    .last
                    .lock()
                    .unwrap()
                    .clone()
                    .unwrap_or_else(|| Err(TransportError::Other("empty script".into()))),
            }
        }
    }

    fn payload() -> RequestPayload {
        RequestPayload::new("Hello").unwrap()
    }

    #[test]
    fn test_backoff_bounds() {
        let backoff = Backoff::default();
        for attempt in 0..5 {
            let floor = 2u64.pow(attempt) * 1000;
            for _ in 0..50 {
                let delay = backoff.delay_for(attempt).as_millis() as u64;
                assert!(delay >= floor, "attempt {attempt}: {delay} < {floor}");
                assert!(delay < floor + 1000, "attempt {attempt}: {delay} too large");
            }
        }
    }

    #[test]
    fn test_backoff_without_jitter_is_exact() {
        let backoff = Backoff {
            base: Duration::from_millis(10),
            jitter: Duration::ZERO,
        };
        assert_eq!(backoff.delay_for(0), Duration::from_millis(10));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(80));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success() {
        let transport = ScriptedTransport::always(ScriptedTransport::ok("Hi, darling!"));
        let client = RetryingRequestClient::new(transport.clone(), DEFAULT_MAX_RETRIES);

        let start = Instant::now();
        let response = assert_ok!(client.send(&payload()).await);
        assert_eq!(response.message, "Hi, darling!");
        assert_eq!(transport.attempts(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_then_success() {
        let k = 3;
        let mut script: Vec<_> = (0..k).map(|_| ScriptedTransport::status(429)).collect();
        script.push(ScriptedTransport::ok("finally"));
        let transport = ScriptedTransport::new(script);
        let client = RetryingRequestClient::new(transport.clone(), DEFAULT_MAX_RETRIES);

        let start = Instant::now();
        let response = assert_ok!(client.send(&payload()).await);
        assert_eq!(response.message, "finally");
        assert_eq!(transport.attempts(), k + 1);

        // Gap i is 2^i * 1000 ms plus under 1000 ms of jitter
        let gaps = transport.gaps();
        assert_eq!(gaps.len(), k as usize);
        for (i, gap) in gaps.iter().enumerate() {
            let floor = Duration::from_millis(1000 << i);
            assert!(*gap >= floor, "gap {i}: {gap:?} < {floor:?}");
            assert!(*gap < floor + Duration::from_millis(1000), "gap {i}: {gap:?} too large");
        }

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(7000), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(10000), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_doubles_between_transport_failures() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Timeout),
            Err(TransportError::Connect("refused".into())),
            ScriptedTransport::ok("back"),
        ]);
        let client = RetryingRequestClient::new(transport.clone(), DEFAULT_MAX_RETRIES);

        assert_ok!(client.send(&payload()).await);

        let gaps = transport.gaps();
        assert_eq!(gaps.len(), 2);
        assert!(gaps[0] >= Duration::from_millis(1000) && gaps[0] < Duration::from_millis(2000));
        assert!(gaps[1] >= Duration::from_millis(2000) && gaps[1] < Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_is_terminal() {
        let transport = ScriptedTransport::always(ScriptedTransport::status(500));
        let client = RetryingRequestClient::new(transport.clone(), DEFAULT_MAX_RETRIES);

        let err = assert_err!(client.send(&payload()).await);
        assert!(matches!(err, ClientError::ServerError { status: 500, .. }));
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_exhausts_attempts() {
        let transport = ScriptedTransport::always(Err(TransportError::Connect("refused".into())));
        let client = RetryingRequestClient::new(transport.clone(), DEFAULT_MAX_RETRIES);

        let start = Instant::now();
        let err = assert_err!(client.send(&payload()).await);
        assert!(matches!(
            err,
            ClientError::Network {
                attempts: 5,
                source: TransportError::Connect(_)
            }
        ));
        assert_eq!(transport.attempts(), DEFAULT_MAX_RETRIES);

        // Four backoffs between five attempts: 1 + 2 + 4 + 8 seconds minimum
        assert!(start.elapsed() >= Duration::from_millis(15000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_on_every_attempt() {
        let transport = ScriptedTransport::always(ScriptedTransport::status(429));
        let client = RetryingRequestClient::new(transport.clone(), 3);

        let start = Instant::now();
        let err = assert_err!(client.send(&payload()).await);
        assert_eq!(err, ClientError::RetriesExhausted { attempts: 3 });
        assert_eq!(transport.attempts(), 3);

        // The final 429 still backs off: 1 + 2 + 4 seconds minimum
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(7000), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(10000), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_body_is_retried() {
        let transport = ScriptedTransport::new(vec![
            Ok(RawResponse::new(200, "not json")),
            ScriptedTransport::ok("recovered"),
        ]);
        let client = RetryingRequestClient::new(transport.clone(), DEFAULT_MAX_RETRIES);

        let response = assert_ok!(client.send(&payload()).await);
        assert_eq!(response.message, "recovered");
        assert_eq!(transport.attempts(), 2);
    }

    #[tokio::test]
    async fn test_zero_attempts_exhausts_immediately() {
        let transport = ScriptedTransport::always(ScriptedTransport::ok("unused"));
        let client = RetryingRequestClient::new(transport.clone(), 0);

        let err = assert_err!(client.send(&payload()).await);
        assert_eq!(err, ClientError::RetriesExhausted { attempts: 0 });
        assert_eq!(transport.attempts(), 0);
    }
}
