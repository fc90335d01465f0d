//! Conversation transcript
//!
//! An ordered, append-only sequence of turns. Insertion order is
//! chronological order is display order; turns are never reordered or
//! edited in place.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::events::ControllerEvent;

/// Opening turn shown before any user input
pub const GREETING: &str = "Hello there, darling! What kind of romantic message or advice can I craft for you today? Ask me anything!";

/// Who a turn is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "YOU"),
            Role::Agent => write!(f, "AI"),
        }
    }
}

/// One message unit in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            role: Role::Agent,
            text: text.into(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl std::fmt::Display for Turn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.role, self.text)
    }
}

/// Append-only transcript
#[derive(Debug, Default)]
pub struct ConversationStore {
    turns: Vec<Turn>,
}

impl ConversationStore {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store opened with the agent's greeting
    pub fn with_greeting(greeting: &str) -> Self {
        Self {
            turns: vec![Turn::agent(greeting)],
        }
    }

    /// Append a turn at the end of the transcript
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    #[cfg(test)]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }
}

/// Shared handle to the transcript that publishes every append
#[derive(Clone)]
pub struct Conversation {
    store: Arc<RwLock<ConversationStore>>,
    event_tx: broadcast::Sender<ControllerEvent>,
}

impl Conversation {
    pub fn new(store: ConversationStore, event_tx: broadcast::Sender<ControllerEvent>) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            event_tx,
        }
    }

    /// Append a turn and notify subscribers
    pub async fn append(&self, turn: Turn) {
        debug!(role = %turn.role(), len = turn.text().len(), "appending turn");
        self.store.write().await.append(turn.clone());
        let _ = self.event_tx.send(ControllerEvent::TurnAppended { turn });
    }

    /// Copy of the transcript in display order
    pub async fn snapshot(&self) -> Vec<Turn> {
        self.store.read().await.turns().to_vec()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }
}
