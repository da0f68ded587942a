//! OpenAI-compatible Backend
//!
//! Streams chat completions from any endpoint speaking the OpenAI
//! `/chat/completions` protocol with `stream: true` (Featherless, OpenRouter,
//! a local llama.cpp server, ...).
//!
//! The response body is handed back untouched as a byte stream; the
//! `data:` event framing is decoded by [`crate::streaming::EventStreamDecoder`].

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};

use super::traits::{ByteStream, CompletionBackend, CompletionRequest};
use crate::config::ConductorConfig;
use crate::error::TransportError;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// OpenAI-compatible streaming client
#[derive(Clone)]
pub struct OpenAiBackend {
    /// Base URL without the `/chat/completions` suffix
    base_url: String,
    /// Bearer token
    api_key: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl OpenAiBackend {
    /// Create a new backend
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http_client: reqwest::Client::new(),
        }
    }

    /// Create from a resolved configuration
    #[must_use]
    pub fn from_config(config: &ConductorConfig) -> Self {
        Self::new(config.base_url.clone(), config.api_key.clone())
    }

    /// Chat completion endpoint URL
    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Model listing endpoint URL
    fn models_url(&self) -> String {
        format!("{}/models", self.base_url)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.api_key)
        }
    }
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("base_url", &self.base_url)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "OpenAI-compatible"
    }

    async fn health_check(&self) -> bool {
        let request = self
            .authorized(self.http_client.get(self.models_url()))
            .timeout(HEALTH_CHECK_TIMEOUT);

        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "Health check failed");
                false
            }
        }
    }

    async fn open_stream(&self, request: &CompletionRequest) -> Result<ByteStream, TransportError> {
        let response = self
            .authorized(self.http_client.post(self.completions_url()))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), "Completion endpoint returned an error");
            return Err(TransportError::from_http_body(status.as_u16(), &body));
        }

        Ok(response.bytes_stream().map_err(TransportError::from).boxed())
    }
}
