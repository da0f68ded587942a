//! Context Builder
//!
//! Assembles the bounded prompt for one request from the current page, the
//! committed history, and the new user message. Building is pure: the same
//! inputs always produce the same prompt, and nothing here touches the
//! network or mutates state.

use crate::backend::ChatMessage;
use crate::config::{ConductorConfig, CONTEXT_CHARS, MAX_HISTORY, MAX_PROMPT_HEADINGS};
use crate::page::{truncate_chars, PageContext, EXTRACTION_BODY_CHARS};
use crate::session::{History, Role, Turn};

/// Instruction sent on every request
pub const SYSTEM_INSTRUCTION: &str = "You are SAMAAN AI, a fast, expert browser assistant. \
Be concise + accurate. Use markdown (bold/lists) where helpful. \
Answer using the page context below if relevant; otherwise use general knowledge.";

/// The full input for one request. Never mutated after dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prompt {
    /// Instruction plus the optional page block
    pub system_message: String,
    /// The most recent committed turns, oldest first
    pub history_window: Vec<Turn>,
    /// The message being sent
    pub new_user_turn: String,
}

impl Prompt {
    /// Flatten into the role/content sequence sent to the endpoint
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history_window.len() + 2);
        messages.push(ChatMessage::system(&self.system_message));
        messages.extend(
            self.history_window
                .iter()
                .map(|turn| ChatMessage::new(turn.role.as_str(), &turn.content)),
        );
        messages.push(ChatMessage::new(Role::User.as_str(), &self.new_user_turn));
        messages
    }
}

/// Builds prompts under fixed size limits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContextBuilder {
    max_history: usize,
    context_chars: usize,
    max_headings: usize,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self {
            max_history: MAX_HISTORY,
            context_chars: CONTEXT_CHARS,
            max_headings: MAX_PROMPT_HEADINGS,
        }
    }
}

impl ContextBuilder {
    /// Builder using the limits carried by a config
    pub fn from_config(config: &ConductorConfig) -> Self {
        Self {
            max_history: config.max_history,
            context_chars: config.context_chars,
            ..Self::default()
        }
    }

    /// Effective body bound: the smaller of the prompt and extraction budgets
    pub fn body_budget(&self) -> usize {
        self.context_chars.min(EXTRACTION_BODY_CHARS)
    }

    /// Build the prompt for `new_message`
    pub fn build(
        &self,
        page: Option<&PageContext>,
        history: &History,
        new_message: &str,
    ) -> Prompt {
        Prompt {
            system_message: self.system_message(page),
            history_window: history.window(self.max_history).to_vec(),
            new_user_turn: new_message.to_string(),
        }
    }

    fn system_message(&self, page: Option<&PageContext>) -> String {
        let Some(page) = page else {
            return SYSTEM_INSTRUCTION.to_string();
        };

        let body = truncate_chars(&page.body_text, self.body_budget());
        let headings = page
            .headings
            .iter()
            .take(self.max_headings)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n");

        let mut parts = vec![format!("\n--- PAGE: {} ({}) ---", page.title, page.url)];
        if !headings.is_empty() {
            parts.push(format!("HEADINGS:\n{headings}"));
        }
        parts.push(format!("CONTENT:\n{body}"));
        parts.push("--- END PAGE ---".to_string());

        format!("{SYSTEM_INSTRUCTION}{}", parts.join("\n"))
    }
}
