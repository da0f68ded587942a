//! Event Stream Decoding
//!
//! Turns raw response body chunks into delta fragments. Chunk boundaries are
//! arbitrary: a multi-byte character or a `data:` line may be split across
//! any number of chunks, so both layers carry their partial tail forward.

use serde::Deserialize;
use tracing::trace;

/// Terminal sentinel of an OpenAI-style event stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Longest unterminated line kept while waiting for its newline
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

// ============================================================================
// UTF-8
// ============================================================================

/// Incremental UTF-8 decoder
///
/// Holds back an incomplete trailing sequence until the next chunk completes
/// it. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Create a decoder with nothing pending
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `bytes` (plus any pending tail) as possible
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid_up_to]));

                    match err.error_len() {
                        // Incomplete sequence at the end: wait for more bytes
                        None => {
                            self.pending.drain(..valid_up_to);
                            break;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid_up_to + len);
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush whatever is still pending at end of stream
    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }

    /// Bytes held back waiting for completion
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

// ============================================================================
// Server-sent events
// ============================================================================

/// A decoded stream event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SseEvent {
    /// A non-empty text delta
    Delta(String),
    /// The stream ended cleanly
    Done,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// Decoder for `data:` framed completion streams
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    utf8: Utf8Decoder,
    line: String,
    /// Inside an oversized line; drop input until its newline
    discarding: bool,
    done: bool,
}

impl EventStreamDecoder {
    /// Create a fresh decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the terminal sentinel has been seen
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one body chunk and collect every event it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        if self.done {
            return Vec::new();
        }

        let text = self.utf8.push(chunk);
        let mut rest = text.as_str();
        if self.discarding {
            let Some(pos) = rest.find('\n') else {
                return Vec::new();
            };
            rest = &rest[pos + 1..];
            self.discarding = false;
        }
        self.line.push_str(rest);

        let mut events = Vec::new();
        while let Some(pos) = self.line.find('\n') {
            let line: String = self.line.drain(..=pos).collect();
            if self.decode_line(&line, &mut events) {
                self.line.clear();
                break;
            }
        }

        if self.line.len() > MAX_LINE_BYTES {
            trace!(bytes = self.line.len(), "Dropping oversized stream line");
            self.line.clear();
            self.discarding = true;
        }
        events
    }

    /// Process a final unterminated line at end of stream
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }

        let tail = self.utf8.finish();
        if self.discarding {
            return events;
        }
        self.line.push_str(&tail);
        let line = std::mem::take(&mut self.line);
        if !line.trim().is_empty() {
            self.decode_line(&line, &mut events);
        }
        events
    }

    /// Returns true once the stream is done
    fn decode_line(&mut self, raw: &str, events: &mut Vec<SseEvent>) -> bool {
        let line = raw.trim_end_matches(['\n', '\r']);
        let Some(data) = line.strip_prefix("data:") else {
            if !line.is_empty() {
                trace!(line, "Ignoring non-data stream line");
            }
            return false;
        };

        let data = data.trim();
        if data == DONE_SENTINEL {
            self.done = true;
            events.push(SseEvent::Done);
            return true;
        }

        match serde_json::from_str::<StreamChunk>(data) {
            Ok(chunk) => {
                let content = chunk
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta)
                    .and_then(|d| d.content)
                    .unwrap_or_default();
                if !content.is_empty() {
                    events.push(SseEvent::Delta(content));
                }
            }
            Err(e) => trace!(error = %e, "Ignoring malformed stream event"),
        }
        false
    }
}
