//! Conductor Messages
//!
//! Messages sent from the Conductor to the UI surface. The surface is a pure
//! renderer: it shows what it is told and keeps no conversation logic of its
//! own. Everything a side panel (or the terminal driver) needs arrives here,
//! in order, over one channel.

use serde::{Deserialize, Serialize};

use crate::render::Document;

/// Messages from Conductor to UI Surface
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ConductorMessage {
    // ============================================
    // Conversation Messages
    // ============================================
    /// The user's message, echoed when a turn is dispatched
    UserTurn {
        /// Turn this message opens
        turn_id: TurnId,
        /// Message text
        content: String,
    },

    /// The first fragment of a response arrived
    StreamStart {
        /// Turn being streamed
        turn_id: TurnId,
    },

    /// A raw delta fragment, for surfaces that stream plain text
    Token {
        /// Turn this fragment belongs to
        turn_id: TurnId,
        /// The fragment text
        text: String,
    },

    /// The rendered response so far (coalesced to paint rate)
    Render {
        /// Turn being rendered
        turn_id: TurnId,
        /// Document for the full accumulated text
        document: Document,
        /// Whether this is the final paint of the turn
        complete: bool,
    },

    /// A response finished and was committed to history
    TurnCommitted {
        /// Turn that completed
        turn_id: TurnId,
        /// Final assistant text as stored
        content: String,
    },

    // ============================================
    // System Messages
    // ============================================
    /// A user-visible notice (errors, cancellations)
    Notice {
        /// Turn the notice replaces, if any
        turn_id: Option<TurnId>,
        /// Notification level
        level: NotifyLevel,
        /// Markdown content
        content: String,
    },

    /// Show or hide the loading indicator
    Loading {
        /// Whether the indicator is visible
        visible: bool,
    },

    /// Conductor state change
    State {
        /// The new state
        state: ConductorState,
    },

    // ============================================
    // Page Context Messages
    // ============================================
    /// Status line describing the loaded page context
    ContextStatus {
        /// Whether a page is loaded
        loaded: bool,
        /// `"<title> · <N> chars"` or the failure detail
        text: String,
    },

    /// Display-only greeting after a context load; never part of history
    Welcome {
        /// Markdown content
        content: String,
    },

    /// The transcript was cleared
    Cleared,

    /// Put text into the input field for the user to send
    PrefillInput {
        /// Suggested input
        text: String,
    },
}

/// Turn identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub String);

impl TurnId {
    /// Generate a new unique turn ID
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        Self(format!("turn_{id}"))
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Notification levels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyLevel {
    /// Informational
    Info,
    /// Warning (cancellations, timeouts)
    Warning,
    /// Error
    Error,
}

/// Conductor operational states
///
/// ```text
/// Idle ──submit──▶ Sending ──first fragment──▶ Streaming ──end──▶ Idle
///                     │                            │
///                     └──────cancel / error────────┴──▶ Error ──▶ Idle
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConductorState {
    /// Ready for input
    #[default]
    Idle,
    /// Request dispatched, nothing received yet
    Sending,
    /// Fragments arriving
    Streaming,
    /// The last turn failed; transient, settles to Idle
    Error,
}

impl ConductorState {
    /// Human-readable description
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Idle => "Ready",
            Self::Sending => "Thinking...",
            Self::Streaming => "Responding...",
            Self::Error => "Error",
        }
    }

    /// Whether a turn is in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Sending | Self::Streaming)
    }
}
