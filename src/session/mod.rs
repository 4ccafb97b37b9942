//! Multi-turn session engine and caller-facing clients.

mod client;
mod core;
mod demux;
mod reactive;

pub use self::client::{AgentClient, MessageStream, RawStream, ResponseStream};
pub use self::core::{SessionCore, DEFAULT_SESSION_ID, TERMINATE_GRACE};
pub use self::demux::{TurnDemux, TurnItem};
pub use self::reactive::{ReactiveClient, TurnSpec};
