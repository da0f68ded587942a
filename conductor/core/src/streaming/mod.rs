//! Streaming Infrastructure
//!
//! Everything between the HTTP body and the accumulated response text.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         StreamSession                            │
//! │   accumulated text, started_at, fragment count                   │
//! │  ┌────────────────────────────────────────────────────────────┐  │
//! │  │                    TransportSession                        │  │
//! │  │   CancellationToken ──┐   idle (30s) ──────┐               │  │
//! │  │                       ▼                    ▼               │  │
//! │  │   ByteStream ──▶ select! { cancelled | sleep_until | next }│  │
//! │  │                       │                                    │  │
//! │  │                       ▼                                    │  │
//! │  │   EventStreamDecoder: UTF-8 tail ─▶ line tail ─▶ data:     │  │
//! │  └───────────────────────┼────────────────────────────────────┘  │
//! │                          ▼                                       │
//! │                   delta fragments                                │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use samaan_conductor::streaming::StreamSession;
//!
//! let mut session = StreamSession::start(backend, request, REQUEST_TIMEOUT);
//! while let Some(fragment) = session.next_fragment().await {
//!     let fragment = fragment?;
//!     println!("{}", session.text());
//! }
//! ```

mod decoder;
mod session;
mod transport;

pub use decoder::{EventStreamDecoder, SseEvent, Utf8Decoder, DONE_SENTINEL};
pub use session::{StreamSession, StreamStats};
pub use transport::TransportSession;
