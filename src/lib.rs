//! Client library for driving the Claude Code CLI over its bidirectional
//! stream-json protocol.
//!
//! The crate spawns the agent binary as a child process, frames newline-
//! delimited JSON over its standard streams, and multiplexes two protocols
//! on that pipe: the data plane of conversation messages and a control
//! plane that lets the process call back into the embedding application
//! (hooks, tool-permission checks, in-process MCP servers) while the caller
//! drives the session (interrupt, model and permission-mode changes).
//!
//! Three clients share the same engine:
//!
//! - [`query::execute`] / [`query::text`]: one-shot, one prompt with one
//!   collected result.
//! - [`session::AgentClient`]: pull-style multi-turn, send a query and
//!   drain the response stream, repeat.
//! - [`session::ReactiveClient`]: turn-oriented, each turn is a
//!   [`session::TurnSpec`] of lazy producers (`text`, `text_stream`,
//!   `messages`).
//!
//! ```no_run
//! use claude_agent_client::options::AgentOptions;
//! use claude_agent_client::query;
//!
//! # async fn demo() -> Result<(), claude_agent_client::AgentError> {
//! let options = AgentOptions::builder().model("claude-sonnet-4-5").build();
//! let answer = query::text("What is 2+2?", options).await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

pub mod control;
pub mod error;
pub mod hooks;
pub mod mcp;
pub mod options;
pub mod permission;
pub mod process;
pub mod query;
pub mod session;
pub mod transport;
pub mod wire;

pub use error::AgentError;
pub use hooks::{HookEvent, HookInput, HookOutput, HookRegistry};
pub use options::{AgentOptions, McpServerConfig, PermissionMode};
pub use permission::{PermissionDecision, ToolPermissionCallback, ToolPermissionContext};
pub use query::{QueryResult, ResultStatus};
pub use session::{AgentClient, ReactiveClient, TurnSpec};
pub use wire::message::{AgentMessage, AssistantMessage, ContentBlock, ResultMessage};
