//! Completion Backend Traits
//!
//! Trait definitions for chat completion backends. The Conductor only needs a
//! raw byte stream from the endpoint; decoding, cancellation and the timeout
//! are handled above this layer by the transport session, so a backend stays
//! a thin HTTP adapter (or an in-memory script in tests).

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::config::{ConductorConfig, MAX_TOKENS, TEMPERATURE, TOP_P};
use crate::error::TransportError;

/// Raw response body chunks as they arrive from the endpoint
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// One role/content pair in a completion request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user` or `assistant`
    pub role: String,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// Create a message with an arbitrary role
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }
}

/// Body of a streamed chat completion request
#[derive(Clone, Debug, Serialize)]
pub struct CompletionRequest {
    /// Model identifier
    pub model: String,
    /// System message, history window, then the new user message
    pub messages: Vec<ChatMessage>,
    /// Response token cap
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling cutoff
    pub top_p: f32,
    /// Always true: responses are consumed incrementally
    pub stream: bool,
}

impl CompletionRequest {
    /// Create a request with the engine defaults
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            top_p: TOP_P,
            stream: true,
        }
    }

    /// Create a request using the sampling settings of a config
    pub fn from_config(config: &ConductorConfig, messages: Vec<ChatMessage>) -> Self {
        Self::new(config.model.clone(), messages)
            .with_max_tokens(config.max_tokens)
            .with_temperature(config.temperature)
            .with_top_p(config.top_p)
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    /// Set top_p
    #[must_use]
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p.clamp(0.0, 1.0);
        self
    }
}

/// Chat completion backend
///
/// Implement this trait to point the Conductor at a different provider.
#[async_trait]
pub trait CompletionBackend: Send + Sync + 'static {
    /// Backend name for logs (e.g., "OpenAI-compatible")
    fn name(&self) -> &str;

    /// Check if the endpoint is reachable and accepts the credentials
    async fn health_check(&self) -> bool;

    /// Dispatch a request and return the raw response body stream.
    ///
    /// Non-success statuses are reported as [`TransportError::Http`] before
    /// any body chunk is produced. Dropping the stream aborts the request.
    async fn open_stream(&self, request: &CompletionRequest) -> Result<ByteStream, TransportError>;
}
