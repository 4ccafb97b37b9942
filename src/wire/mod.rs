//! Wire protocol: message model, control envelopes, and line classification.

pub mod control;
pub mod message;
pub mod parse;

pub use control::{
    ControlOutcome, ControlRequestPayload, InboundControlRequest, InboundControlResponse,
    OutboundControlRequest, OutboundControlResponse,
};
pub use message::{
    AgentMessage, AssistantMessage, ContentBlock, MessageBody, ResultMessage, StreamEvent,
    SystemMessage, UserMessage,
};
pub use parse::{FrameParser, InboundFrame, ParseError};
