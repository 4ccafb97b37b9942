//! Pull-style multi-turn client.
//!
//! `AgentClient` keeps one process alive across turns; conversation context
//! is preserved because the process retains state, the client simply
//! multiplexes turns on the same transport. Responses are drawn by
//! consuming the stream from [`AgentClient::receive_response`] to
//! completion before issuing the next query.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::AgentError;
use crate::hooks::HookRegistry;
use crate::options::AgentOptions;
use crate::permission::ToolPermissionCallback;
use crate::session::core::SessionCore;
use crate::session::demux::TurnItem;
use crate::wire::parse::InboundFrame;

/// Stream of one turn's messages; ends after the turn's `result`.
pub type ResponseStream = UnboundedReceiverStream<TurnItem>;

/// Stream of every data-plane message for the life of the session.
pub type MessageStream = UnboundedReceiverStream<TurnItem>;

/// Stream of every parsed inbound frame, control traffic included.
pub type RawStream = UnboundedReceiverStream<InboundFrame>;

/// Multi-turn session client.
pub struct AgentClient {
    core: Arc<SessionCore>,
}

impl AgentClient {
    /// Create a client from an options record. Nothing is spawned until
    /// [`AgentClient::connect`].
    #[must_use]
    pub fn new(options: AgentOptions) -> Self {
        Self {
            core: SessionCore::new(options),
        }
    }

    /// The hook registry. Register hooks before connecting so they are
    /// advertised to the process.
    #[must_use]
    pub fn hooks(&self) -> &HookRegistry {
        self.core.hooks()
    }

    /// Install the tool permission callback.
    pub fn set_permission_callback(&self, callback: Arc<dyn ToolPermissionCallback>) {
        self.core.set_permission_callback(callback);
    }

    /// Spawn the process and connect, without an initial prompt.
    ///
    /// # Errors
    ///
    /// [`AgentError::TransportUnavailable`] when the binary cannot be
    /// launched; state errors on misuse.
    pub async fn connect(&self) -> Result<(), AgentError> {
        Arc::clone(&self.core).connect(None).await
    }

    /// Spawn the process and send an initial prompt in one step.
    ///
    /// # Errors
    ///
    /// Same as [`AgentClient::connect`].
    pub async fn connect_with_prompt(&self, prompt: &str) -> Result<(), AgentError> {
        Arc::clone(&self.core).connect(Some(prompt)).await
    }

    /// Attach to an agent over arbitrary byte streams instead of spawning a
    /// process.
    ///
    /// # Errors
    ///
    /// State errors on misuse.
    pub async fn connect_io(
        &self,
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Result<(), AgentError> {
        Arc::clone(&self.core).connect_io(reader, writer, None).await
    }

    /// Send a prompt for the next turn.
    ///
    /// Subscribe with [`AgentClient::receive_response`] *before* calling
    /// this when you need the turn's messages; the process may start
    /// answering immediately.
    ///
    /// # Errors
    ///
    /// [`AgentError::NotConnected`] before connect, [`AgentError::Closed`]
    /// after close, or the transport write error.
    pub async fn query(&self, prompt: &str) -> Result<(), AgentError> {
        self.core.send_user_message(prompt).await
    }

    /// Stream of every data-plane message until the session ends.
    #[must_use]
    pub fn receive_messages(&self) -> MessageStream {
        UnboundedReceiverStream::new(self.core.subscribe_all())
    }

    /// Stream for the current turn, completing after the next `result`.
    /// Installing it supersedes (and completes) any previous turn stream.
    #[must_use]
    pub fn receive_response(&self) -> ResponseStream {
        UnboundedReceiverStream::new(self.core.subscribe_turn())
    }

    /// Raw tap over every parsed frame, for low-level observability.
    #[must_use]
    pub fn receive_raw(&self) -> RawStream {
        UnboundedReceiverStream::new(self.core.subscribe_raw())
    }

    /// Abort the agent's current work.
    ///
    /// # Errors
    ///
    /// State errors, `control-timeout`, or `control-error`.
    pub async fn interrupt(&self) -> Result<(), AgentError> {
        self.core.interrupt().await
    }

    /// Change the permission mode mid-session.
    ///
    /// # Errors
    ///
    /// State errors, `control-timeout`, or `control-error`.
    pub async fn set_permission_mode(&self, mode: &str) -> Result<(), AgentError> {
        self.core.set_permission_mode(mode).await
    }

    /// Switch models mid-session.
    ///
    /// # Errors
    ///
    /// State errors, `control-timeout`, or `control-error`.
    pub async fn set_model(&self, model: &str) -> Result<(), AgentError> {
        self.core.set_model(model).await
    }

    /// Returns true while the session can exchange messages.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    /// The current session identifier.
    #[must_use]
    pub fn session_id(&self) -> String {
        self.core.session_id()
    }

    /// The model currently in effect, if known.
    #[must_use]
    pub fn current_model(&self) -> Option<String> {
        self.core.current_model()
    }

    /// The permission mode currently in effect, if known.
    #[must_use]
    pub fn current_permission_mode(&self) -> Option<String> {
        self.core.current_permission_mode()
    }

    /// Process metadata captured from its `initialize` control request.
    #[must_use]
    pub fn server_info(&self) -> Option<serde_json::Value> {
        self.core.server_info()
    }

    /// Close the session and terminate the process. Idempotent.
    ///
    /// # Errors
    ///
    /// I/O errors from process teardown.
    pub async fn close(&self) -> Result<(), AgentError> {
        self.core.close().await
    }
}
