//! Surface Events
//!
//! Events sent from the UI surface to the Conductor. The surface reports
//! what the user did; the Conductor decides what it means and answers with
//! [`ConductorMessage`](crate::messages::ConductorMessage)s.

use serde::{Deserialize, Serialize};

use crate::page::ExtractionResponse;

/// Events from UI Surface to Conductor
#[derive(Clone, Debug, Deserialize)]
pub enum SurfaceEvent {
    // ============================================
    // User Input Events
    // ============================================
    /// User submitted a message (rejected while a turn is in flight)
    UserMessage {
        /// The message content
        content: String,
    },

    /// User submitted a message that replaces the turn in flight
    Interrupt {
        /// The message content
        content: String,
    },

    /// User pressed stop
    Cancel,

    // ============================================
    // Panel Events
    // ============================================
    /// User cleared the chat
    ClearChat,

    /// A fresh page extraction finished (manual re-read or panel open)
    RefreshContext {
        /// Raw extraction result
        response: ExtractionResponse,
    },

    /// User selected text on the page
    ClarifySelection {
        /// The selected text
        text: String,
    },
}

/// Kind of surface event, for logging
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SurfaceEventKind {
    /// [`SurfaceEvent::UserMessage`]
    UserMessage,
    /// [`SurfaceEvent::Interrupt`]
    Interrupt,
    /// [`SurfaceEvent::Cancel`]
    Cancel,
    /// [`SurfaceEvent::ClearChat`]
    ClearChat,
    /// [`SurfaceEvent::RefreshContext`]
    RefreshContext,
    /// [`SurfaceEvent::ClarifySelection`]
    ClarifySelection,
}

impl SurfaceEvent {
    /// The event's kind
    pub fn kind(&self) -> SurfaceEventKind {
        match self {
            Self::UserMessage { .. } => SurfaceEventKind::UserMessage,
            Self::Interrupt { .. } => SurfaceEventKind::Interrupt,
            Self::Cancel => SurfaceEventKind::Cancel,
            Self::ClearChat => SurfaceEventKind::ClearChat,
            Self::RefreshContext { .. } => SurfaceEventKind::RefreshContext,
            Self::ClarifySelection { .. } => SurfaceEventKind::ClarifySelection,
        }
    }
}
