//! Completion Backend Integration
//!
//! This module provides access to chat completion endpoints through a common
//! trait interface.
//!
//! # Available Backends
//!
//! - **OpenAI-compatible**: any `/chat/completions` endpoint with SSE streaming
//!
//! # Usage
//!
//! ```ignore
//! use samaan_conductor::backend::{CompletionBackend, CompletionRequest, OpenAiBackend};
//!
//! let backend = OpenAiBackend::from_config(&config);
//! let request = CompletionRequest::from_config(&config, prompt.to_messages());
//! let body = backend.open_stream(&request).await?;
//! ```

mod openai;
mod traits;

pub use openai::OpenAiBackend;
pub use traits::{ByteStream, ChatMessage, CompletionBackend, CompletionRequest};
