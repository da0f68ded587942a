//! Engine Errors
//!
//! Error taxonomy for the conversation engine. Validation errors are raised
//! before anything touches the network; transport errors describe how an
//! in-flight request ended. The renderer has no error type: it is total.

use serde::Deserialize;
use thiserror::Error;

/// Wording shared by the timeout and cancellation paths
pub const CANCELLED_NOTICE: &str = "⏹️ **Request cancelled or timed out.** Try again.";

/// A submission rejected before dispatch
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The message was empty after trimming
    #[error("message is empty")]
    EmptyMessage,
    /// Another turn is still in flight
    #[error("a response is already in progress")]
    TurnInFlight,
    /// There is no turn to drive
    #[error("no response is in progress")]
    NoActiveTurn,
}

/// How an in-flight completion request failed
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The endpoint stayed silent past the request timeout
    #[error("request timed out")]
    Timeout,
    /// The session was cancelled by the caller
    #[error("request cancelled")]
    Cancelled,
    /// The endpoint answered with a non-success status
    #[error("{message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Detail from the error body, or a generic status message
        message: String,
    },
    /// Connection or body read failure
    #[error("network error: {0}")]
    Network(String),
}

impl TransportError {
    /// Build an HTTP error from a status code and the raw response body.
    ///
    /// Uses `error.message` from a structured body when present.
    pub fn from_http_body(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.error)
            .and_then(|e| e.message)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("API error {status}"));

        Self::Http { status, message }
    }

    /// Whether this error came from a timeout or an explicit cancel
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Timeout | Self::Cancelled)
    }

    /// Text shown to the user in place of the failed answer
    #[must_use]
    pub fn user_message(&self) -> String {
        if self.is_cancellation() {
            CANCELLED_NOTICE.to_string()
        } else {
            format!("⚠️ **Error:** {self}")
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(e.to_string())
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}
