//! Line classifier.
//!
//! Every inbound stdout line is either a data-plane message, a control
//! request from the process, or a control response to one of our requests.
//! Classification happens on the `type` field; anything else about the line
//! is left to the variant parsers.

use serde_json::Value;

use crate::wire::control::{InboundControlRequest, InboundControlResponse};
use crate::wire::message::AgentMessage;

/// Error type for line parsing.
#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    /// The line was not valid JSON.
    #[error("invalid JSON: {reason}")]
    InvalidJson {
        /// The offending line.
        input: String,
        /// The decoder's reason.
        reason: String,
    },
    /// The line was valid JSON but did not match the expected envelope.
    #[error("malformed {frame}: {reason}")]
    Malformed {
        /// Which envelope failed ("control_request" or "control_response").
        frame: &'static str,
        /// What was missing.
        reason: String,
    },
}

/// One classified inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Conversation message for the data plane.
    Data(AgentMessage),
    /// The process asks the caller to decide or compute something.
    ControlRequest(InboundControlRequest),
    /// The process answers a caller-initiated control request.
    ControlResponse(InboundControlResponse),
}

/// Parses stdout lines into [`InboundFrame`]s.
pub struct FrameParser;

impl FrameParser {
    /// Parse a single stdout line.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidJson`] for non-JSON lines (diagnostic
    /// noise; the caller logs and skips them) and [`ParseError::Malformed`]
    /// for JSON that claims to be a control envelope but is missing
    /// required fields.
    pub fn parse_line(line: &str) -> Result<InboundFrame, ParseError> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| ParseError::InvalidJson {
                input: line.to_string(),
                reason: e.to_string(),
            })?;

        Self::classify(value)
    }

    /// Classify an already-decoded JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Malformed`] for broken control envelopes.
    pub fn classify(value: Value) -> Result<InboundFrame, ParseError> {
        match value.get("type").and_then(Value::as_str) {
            Some("control_request") => InboundControlRequest::from_value(&value)
                .map(InboundFrame::ControlRequest)
                .map_err(|reason| ParseError::Malformed {
                    frame: "control_request",
                    reason,
                }),
            Some("control_response") => InboundControlResponse::from_value(&value)
                .map(InboundFrame::ControlResponse)
                .map_err(|reason| ParseError::Malformed {
                    frame: "control_response",
                    reason,
                }),
            _ => AgentMessage::from_value(value)
                .map(InboundFrame::Data)
                .map_err(|e| ParseError::Malformed {
                    frame: "message",
                    reason: e.to_string(),
                }),
        }
    }
}
