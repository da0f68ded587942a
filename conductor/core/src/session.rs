//! Conversation History
//!
//! The ordered transcript of committed turns. History only grows by whole
//! turns after a response completes; a cancelled or failed turn never
//! reaches it. Clearing is wholesale.
//!
//! The full transcript is kept, but only a suffix window of it is sent with
//! each prompt (see [`History::window`]).

use serde::{Deserialize, Serialize};

/// Who authored a turn
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person using the panel
    User,
    /// The model
    Assistant,
}

impl Role {
    /// Wire name used in chat completion requests
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One committed message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Author
    pub role: Role,
    /// Message text
    pub content: String,
}

impl Turn {
    /// A user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// An assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Append-only conversation transcript
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct History {
    turns: Vec<Turn>,
}

impl History {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a completed exchange
    pub fn commit_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.turns.push(Turn::user(user));
        self.turns.push(Turn::assistant(assistant));
    }

    /// The last `count` turns, oldest first
    pub fn window(&self, count: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(count);
        &self.turns[start..]
    }

    /// Every turn
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether nothing has been committed
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Drop every turn
    pub fn clear(&mut self) {
        let removed = self.turns.len();
        self.turns.clear();
        tracing::debug!(removed, "Cleared conversation history");
    }
}
