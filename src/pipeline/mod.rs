//! Submission pipeline
//!
//! validate -> append user turn -> request -> append agent turn -> release
//! the busy flag. Failures never escape: each one becomes an agent turn.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::client::{ClientError, RequestPayload, RetryingRequestClient};
use crate::conversation::{Conversation, Turn};

/// How a submission ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// Blank input, nothing happened
    Skipped,
    /// The service replied and the reply was appended
    Replied,
    /// The request failed and a diagnostic was appended
    Failed(ClientError),
}

/// Text shown in place of a reply when a request fails
pub fn failure_diagnostic(error: &ClientError) -> String {
    format!("Error: The connection to the AI heart is broken. Please try again! ({error})")
}

/// Clears the busy flag when dropped
struct BusyGuard {
    flag: Arc<AtomicBool>,
}

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self {
            flag: Arc::clone(flag),
        }
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Runs one submission at a time against the request client
#[derive(Clone)]
pub struct SubmissionPipeline {
    client: Arc<RetryingRequestClient>,
    conversation: Conversation,
    busy: Arc<AtomicBool>,
}

impl SubmissionPipeline {
    pub fn new(client: RetryingRequestClient, conversation: Conversation) -> Self {
        Self {
            client: Arc::new(client),
            conversation,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a submission is in flight
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Submit input text and append the resulting turns.
    ///
    /// The user turn is appended before the request is sent and is kept even
    /// if the request fails.
    pub async fn submit(&self, raw_text: &str) -> SubmissionOutcome {
        let text = raw_text.trim();
        let Some(payload) = RequestPayload::new(text) else {
            return SubmissionOutcome::Skipped;
        };

        self.conversation.append(Turn::user(text)).await;
        let _busy = BusyGuard::acquire(&self.busy);

        match self.client.send(&payload).await {
            Ok(response) => {
                info!(len = response.message.len(), "reply received");
                self.conversation.append(Turn::agent(response.message)).await;
                SubmissionOutcome::Replied
            }
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "submission failed");
                self.conversation.append(Turn::agent(failure_diagnostic(&e))).await;
                SubmissionOutcome::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::broadcast;

    use crate::client::{ScriptedTransport, DEFAULT_MAX_RETRIES};
    use crate::conversation::{ConversationStore, Role, GREETING};

    fn pipeline(transport: Arc<ScriptedTransport>) -> SubmissionPipeline {
        let (tx, _) = broadcast::channel(64);
        let conversation = Conversation::new(ConversationStore::with_greeting(GREETING), tx);
        SubmissionPipeline::new(
            RetryingRequestClient::new(transport, DEFAULT_MAX_RETRIES),
            conversation,
        )
    }

    #[tokio::test]
    async fn test_successful_reply() {
        let transport = ScriptedTransport::always(ScriptedTransport::ok("Hi, darling!"));
        let pipeline = pipeline(transport);

        let outcome = pipeline.submit("Hello").await;
        assert_eq!(outcome, SubmissionOutcome::Replied);

        let turns = pipeline.conversation().snapshot().await;
        assert_eq!(
            &turns[turns.len() - 2..],
            &[Turn::user("Hello"), Turn::agent("Hi, darling!")]
        );
        assert!(!pipeline.is_busy());
    }

    #[tokio::test]
    async fn test_blank_input_is_noop() {
        let transport = ScriptedTransport::always(ScriptedTransport::ok("unused"));
        let pipeline = pipeline(transport.clone());

        for input in ["", "   ", "\n\t"] {
            assert_eq!(pipeline.submit(input).await, SubmissionOutcome::Skipped);
        }

        assert_eq!(pipeline.conversation().len().await, 1);
        assert_eq!(transport.attempts(), 0);
        assert!(!pipeline.is_busy());
    }

    #[tokio::test]
    async fn test_service_unavailable_becomes_diagnostic() {
        let transport = ScriptedTransport::always(ScriptedTransport::status(503));
        let pipeline = pipeline(transport.clone());

        let outcome = pipeline.submit("Hello").await;
        assert!(matches!(
            outcome,
            SubmissionOutcome::Failed(ClientError::ServerError { status: 503, .. })
        ));
        assert_eq!(transport.attempts(), 1);

        let turns = pipeline.conversation().snapshot().await;
        let n = turns.len();
        assert_eq!(turns[n - 2], Turn::user("Hello"));
        assert_eq!(turns[n - 1].role(), Role::Agent);
        assert!(turns[n - 1].text().starts_with("Error:"));
        assert!(!pipeline.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_while_in_flight() {
        let transport = ScriptedTransport::new(vec![
            ScriptedTransport::status(429),
            ScriptedTransport::ok("after wait"),
        ]);
        let pipeline = pipeline(transport);

        let task = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.submit("Hello").await }
        });

        // Let the task reach its backoff sleep
        while pipeline.conversation().len().await < 2 {
            tokio::task::yield_now().await;
        }
        tokio::task::yield_now().await;
        assert!(pipeline.is_busy());

        assert_eq!(task.await.unwrap(), SubmissionOutcome::Replied);
        assert!(!pipeline.is_busy());
    }

    #[tokio::test]
    async fn test_input_is_trimmed() {
        let transport = ScriptedTransport::always(ScriptedTransport::ok("ok"));
        let pipeline = pipeline(transport);

        pipeline.submit("  Hello  \n").await;
        let turns = pipeline.conversation().snapshot().await;
        assert_eq!(turns[1], Turn::user("Hello"));
    }
}
