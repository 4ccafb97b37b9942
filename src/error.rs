//! Crate-wide error taxonomy.
//!
//! Errors are grouped by what the caller can do about them: transport errors
//! are fatal for the session, control errors are surfaced only to the
//! operation that initiated them, and state errors are returned synchronously
//! from misused APIs.

/// Errors produced by sessions, queries, and control operations.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The agent binary could not be resolved or launched.
    #[error("agent transport unavailable: {0}")]
    TransportUnavailable(String),

    /// The agent process exited while messages or control requests were
    /// still pending.
    #[error("agent process terminated unexpectedly (exit code {})", display_exit_code(.exit_code))]
    TransportTerminated {
        /// Exit code of the process, if one was observed.
        exit_code: Option<i32>,
    },

    /// The process sent a line that parsed as JSON but did not match any
    /// known wire shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A caller-initiated control request received no response within the
    /// operation timeout.
    #[error("control request timed out: {subtype}")]
    ControlTimeout {
        /// Subtype of the request that timed out.
        subtype: String,
    },

    /// The process answered a caller-initiated control request with an
    /// error payload.
    #[error("control request failed: {0}")]
    ControlError(String),

    /// The session was closed before a pending operation resolved.
    #[error("session closed while request was pending")]
    ClosedWhilePending,

    /// An operation that requires a live session was called before
    /// `connect()`.
    #[error("session is not connected")]
    NotConnected,

    /// `connect()` was called on a session that is already connected.
    #[error("session is already connected")]
    AlreadyConnected,

    /// An operation was called on a closed session.
    #[error("session is closed")]
    Closed,

    /// A caller-supplied hook, permission, or MCP callback failed.
    #[error("callback failed: {0}")]
    CallbackError(String),

    /// I/O error on the process's standard streams.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize an outbound message.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

fn display_exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "unknown".to_string(),
    }
}

impl AgentError {
    /// Returns true if this error ends the session (transport-level failure
    /// or explicit close), as opposed to a per-operation failure.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::TransportUnavailable(_) | Self::TransportTerminated { .. } | Self::Closed
        )
    }
}
