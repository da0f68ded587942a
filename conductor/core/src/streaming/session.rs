//! Stream Session
//!
//! A transport session plus the text accumulated from it so far. The
//! accumulated text only ever grows, by exactly one fragment per successful
//! [`StreamSession::next_fragment`].

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::transport::TransportSession;
use crate::backend::{CompletionBackend, CompletionRequest};
use crate::error::TransportError;

/// Statistics for a stream session
#[derive(Clone, Copy, Debug, Default)]
pub struct StreamStats {
    /// Fragments received
    pub fragments: u32,
    /// Time from start to the first fragment
    pub first_fragment_after: Option<Duration>,
    /// Time since start
    pub elapsed: Duration,
}

/// The response currently being streamed
#[derive(Debug)]
pub struct StreamSession {
    transport: TransportSession,
    accumulated: String,
    started_at: Instant,
    first_fragment_at: Option<Instant>,
    fragments: u32,
}

impl StreamSession {
    /// Start streaming `request` from `backend`
    pub fn start<B: CompletionBackend>(
        backend: Arc<B>,
        request: CompletionRequest,
        timeout: Duration,
    ) -> Self {
        Self::from_transport(TransportSession::start(backend, request, timeout))
    }

    /// Wrap an existing transport session
    pub fn from_transport(transport: TransportSession) -> Self {
        Self {
            transport,
            accumulated: String::new(),
            started_at: Instant::now(),
            first_fragment_at: None,
            fragments: 0,
        }
    }

    /// Receive the next fragment and append it to the accumulated text.
    ///
    /// Cancel-safe, like [`TransportSession::next`].
    pub async fn next_fragment(&mut self) -> Option<Result<String, TransportError>> {
        let item = self.transport.next().await;
        if let Some(Ok(ref fragment)) = item {
            self.accumulated.push_str(fragment);
            self.fragments += 1;
            self.first_fragment_at.get_or_insert_with(Instant::now);
        }
        item
    }

    /// Text received so far
    pub fn text(&self) -> &str {
        &self.accumulated
    }

    /// Consume the session, keeping the final text
    pub fn into_text(self) -> String {
        self.accumulated
    }

    /// Whether at least one fragment has arrived
    pub fn has_started(&self) -> bool {
        self.fragments > 0
    }

    /// Whether the transport has not yet reported its end
    pub fn is_active(&self) -> bool {
        !self.transport.is_closed()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.transport.cancel();
    }

    /// Token that cancels this session
    pub fn cancel_token(&self) -> CancellationToken {
        self.transport.cancel_token()
    }

    /// Current statistics
    pub fn stats(&self) -> StreamStats {
        StreamStats {
            fragments: self.fragments,
            first_fragment_after: self
                .first_fragment_at
                .map(|at| at.duration_since(self.started_at)),
            elapsed: self.started_at.elapsed(),
        }
    }
}
