//! Conductor Core - Headless Streaming Conversation Engine for SAMAAN
//!
//! This crate provides the conversation engine behind the SAMAAN side-panel
//! assistant, independent of any UI. A surface (the browser panel, the
//! terminal driver, a test) feeds it the page the user is reading and the
//! messages they type; it streams answers from an OpenAI-compatible
//! completion endpoint and hands back rendered documents at paint rate.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        UI Surfaces                               │
//! │       ┌──────────────┐   ┌──────────────┐   ┌──────────────┐     │
//! │       │  Side panel  │   │  samaan-chat │   │   Headless   │     │
//! │       └──────┬───────┘   └──────┬───────┘   └──────┬───────┘     │
//! │              └──────────────────┴──────────────────┘             │
//! │                    SurfaceEvent (up)                             │
//! │                  ConductorMessage (down)                         │
//! └───────────────────────────┬──────────────────────────────────────┘
//!                             │
//! ┌───────────────────────────┼──────────────────────────────────────┐
//! │                    CONDUCTOR CORE                                │
//! │  ┌────────────────────────┴────────────────────────────────────┐ │
//! │  │                      Conductor                               │ │
//! │  │  ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌──────────────┐ │ │
//! │  │  │ Context  │  │  Stream  │  │  Render  │  │   Renderer   │ │ │
//! │  │  │ Builder  │  │ Session  │  │Scheduler │  │  (markdown)  │ │ │
//! │  │  └──────────┘  └────┬─────┘  └──────────┘  └──────────────┘ │ │
//! │  └─────────────────────┼───────────────────────────────────────┘ │
//! │                 ┌──────┴──────┐                                  │
//! │                 │   Backend   │  POST /chat/completions (SSE)    │
//! │                 └─────────────┘                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Conductor`]: The session controller that owns history and the active turn
//! - [`ConductorMessage`]: Messages sent from Conductor to UI surfaces
//! - [`SurfaceEvent`]: Events sent from UI surfaces to Conductor
//! - [`PageContext`]: The page being read
//! - [`Document`]: Structured rendering of a markdown response
//!
//! # Quick Start
//!
//! ```ignore
//! use samaan_conductor::{load_config, Conductor, OpenAiBackend};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config()?;
//!     let (tx, mut rx) = mpsc::channel(256);
//!
//!     let backend = OpenAiBackend::from_config(&config);
//!     let mut conductor = Conductor::new(backend, config, tx);
//!
//!     conductor.submit("What is this page about?").await?;
//!     loop {
//!         let progress = conductor.step().await;
//!         while let Ok(msg) = rx.try_recv() {
//!             // Render message to UI
//!         }
//!         if matches!(progress, samaan_conductor::Progress::Finished(_)) {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: Completion endpoint abstraction (OpenAI-compatible)
//! - [`config`]: Defaults, TOML file, and environment overrides
//! - [`context`]: Prompt assembly under fixed size limits
//! - [`conductor`]: Main Conductor struct
//! - [`error`]: Validation and transport errors
//! - [`events`]: Events from UI surfaces to Conductor
//! - [`messages`]: Messages from Conductor to UI surfaces
//! - [`page`]: Page context ingestion
//! - [`render`]: Incremental markdown to document renderer
//! - [`scheduler`]: Paint coalescing and frame clock
//! - [`session`]: Committed conversation history
//! - [`streaming`]: SSE decoding and the cancellable transport session
//!
//! # No UI Dependencies
//!
//! This crate has **zero** dependencies on any UI framework or browser API.
//! Page extraction happens on the surface; the engine only sees its result.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod conductor;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod messages;
pub mod page;
pub mod render;
pub mod scheduler;
pub mod session;
pub mod streaming;

// Re-exports for convenience
pub use backend::{ChatMessage, CompletionBackend, CompletionRequest, OpenAiBackend};
pub use conductor::{clarify_prompt, Conductor, Progress, TurnOutcome, NO_RESPONSE};
pub use context::{ContextBuilder, Prompt, SYSTEM_INSTRUCTION};
pub use error::{TransportError, ValidationError, CANCELLED_NOTICE};
pub use events::{SurfaceEvent, SurfaceEventKind};
pub use messages::{ConductorMessage, ConductorState, NotifyLevel, TurnId};
pub use page::{ExtractionResponse, PageContext, PageContextError, PageLink};
pub use session::{History, Role, Turn};

// Rendering exports
pub use render::{render, Block, Document, Inline, Span};

// Streaming exports
pub use scheduler::{FrameClock, RenderScheduler, SchedulerStats};
pub use streaming::{EventStreamDecoder, SseEvent, StreamSession, StreamStats, TransportSession};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConductorConfig, ConductorToml,
    ConfigError,
};
