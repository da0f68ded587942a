//! Transport Session
//!
//! One in-flight completion request. The session owns the cancellation
//! token and the deadline, pulls body chunks from the backend, and yields
//! decoded delta fragments one at a time.
//!
//! The deadline is an inactivity bound: it starts when the session is
//! created and moves forward whenever the endpoint shows progress (headers
//! or a body chunk). An answer that keeps streaming is never cut off; an
//! endpoint that goes quiet for the whole timeout is.
//!
//! Every await inside [`TransportSession::next`] races the body against the
//! token and the deadline, so a cancel is observed at the next suspension
//! point without polling. Once cancellation is observed, buffered fragments
//! are discarded and the body stream is dropped, which aborts the request.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::decoder::{EventStreamDecoder, SseEvent};
use crate::backend::{ByteStream, CompletionBackend, CompletionRequest};
use crate::error::TransportError;

enum Phase {
    /// Request built but not yet sent; polled on the first `next()`
    Connecting(BoxFuture<'static, Result<ByteStream, TransportError>>),
    /// Headers received, reading the body
    Streaming(ByteStream),
    /// Body fully read or aborted
    Finished,
}

enum Wake {
    Cancelled,
    Deadline,
    Connected(Result<ByteStream, TransportError>),
    Chunk(Option<Result<Bytes, TransportError>>),
}

/// A single cancellable streamed request
pub struct TransportSession {
    phase: Phase,
    decoder: EventStreamDecoder,
    ready: VecDeque<String>,
    cancel: CancellationToken,
    timeout: Duration,
    deadline: Instant,
    timed_out: bool,
    closed: bool,
}

impl TransportSession {
    /// Prepare a request against `backend`. The deadline starts now; the
    /// request itself is sent on the first call to [`Self::next`].
    /// `timeout` is the longest the endpoint may stay silent.
    pub fn start<B: CompletionBackend>(
        backend: Arc<B>,
        request: CompletionRequest,
        timeout: Duration,
    ) -> Self {
        let connect = async move { backend.open_stream(&request).await }.boxed();

        Self {
            phase: Phase::Connecting(connect),
            decoder: EventStreamDecoder::new(),
            ready: VecDeque::new(),
            cancel: CancellationToken::new(),
            timeout,
            deadline: Instant::now() + timeout,
            timed_out: false,
            closed: false,
        }
    }

    /// Next delta fragment.
    ///
    /// `None` means the stream finished cleanly (or the session already
    /// reported its terminal error). Cancel-safe: dropping the future
    /// loses no data.
    pub async fn next(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            if self.closed {
                return None;
            }
            if !self.timed_out && Instant::now() >= self.deadline {
                self.fire_deadline();
            }
            if self.cancel.is_cancelled() {
                return Some(Err(self.abort()));
            }
            if let Some(fragment) = self.ready.pop_front() {
                return Some(Ok(fragment));
            }

            let deadline = self.deadline;
            let wake = match &mut self.phase {
                Phase::Finished => {
                    self.closed = true;
                    return None;
                }
                Phase::Connecting(connect) => tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Wake::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => Wake::Deadline,
                    result = connect => Wake::Connected(result),
                },
                Phase::Streaming(body) => tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Wake::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => Wake::Deadline,
                    chunk = body.next() => Wake::Chunk(chunk),
                },
            };

            match wake {
                Wake::Cancelled => {}
                Wake::Deadline => self.fire_deadline(),
                Wake::Connected(Ok(body)) => {
                    debug!("Completion stream opened");
                    self.rearm_deadline();
                    self.phase = Phase::Streaming(body);
                }
                Wake::Connected(Err(e)) | Wake::Chunk(Some(Err(e))) => {
                    self.phase = Phase::Finished;
                    self.ready.clear();
                    self.closed = true;
                    return Some(Err(e));
                }
                Wake::Chunk(Some(Ok(bytes))) => {
                    self.rearm_deadline();
                    let events = self.decoder.feed(&bytes);
                    self.enqueue(events);
                }
                Wake::Chunk(None) => {
                    let events = self.decoder.finish();
                    self.enqueue(events);
                    self.phase = Phase::Finished;
                }
            }
        }
    }

    /// Request cancellation. Observed at the next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this session when triggered
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the endpoint stayed silent past the timeout
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// Whether the session has reported its end
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn enqueue(&mut self, events: Vec<SseEvent>) {
        for event in events {
            match event {
                SseEvent::Delta(text) => self.ready.push_back(text),
                SseEvent::Done => {
                    self.phase = Phase::Finished;
                    break;
                }
            }
        }
    }

    fn rearm_deadline(&mut self) {
        self.deadline = Instant::now() + self.timeout;
    }

    fn fire_deadline(&mut self) {
        debug!(
            timeout_ms = self.timeout.as_millis() as u64,
            "Completion endpoint went silent"
        );
        self.timed_out = true;
        self.cancel.cancel();
    }

    fn abort(&mut self) -> TransportError {
        self.ready.clear();
        self.phase = Phase::Finished;
        self.closed = true;

        if self.timed_out {
            TransportError::Timeout
        } else {
            TransportError::Cancelled
        }
    }
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let phase = match self.phase {
            Phase::Connecting(_) => "connecting",
            Phase::Streaming(_) => "streaming",
            Phase::Finished => "finished",
        };
        f.debug_struct("TransportSession")
            .field("phase", &phase)
            .field("ready", &self.ready.len())
            .field("timed_out", &self.timed_out)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
