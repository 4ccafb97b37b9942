//! Turn-oriented reactive client.
//!
//! Each turn is represented by a [`TurnSpec`]: three lazy producers over
//! the same turn. Nothing touches the transport until one of them is
//! polled; the connected check, the turn-slot swap, and the query send all
//! happen at subscription time, so a chain can be composed before the
//! session is connected without an eager "not connected" error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::AgentError;
use crate::hooks::HookRegistry;
use crate::options::AgentOptions;
use crate::permission::ToolPermissionCallback;
use crate::session::core::SessionCore;
use crate::wire::message::{AgentMessage, ResultMessage};

/// Reactive multi-turn client.
pub struct ReactiveClient {
    core: Arc<SessionCore>,
}

impl ReactiveClient {
    /// Create a client from an options record.
    #[must_use]
    pub fn new(options: AgentOptions) -> Self {
        Self {
            core: SessionCore::new(options),
        }
    }

    /// The hook registry.
    #[must_use]
    pub fn hooks(&self) -> &HookRegistry {
        self.core.hooks()
    }

    /// Install the tool permission callback.
    pub fn set_permission_callback(&self, callback: Arc<dyn ToolPermissionCallback>) {
        self.core.set_permission_callback(callback);
    }

    /// Register a handler invoked for every regular message, before it is
    /// forwarded to the turn subscriber. Runs inline on the dispatch path;
    /// keep it fast.
    pub fn on_message(&self, handler: impl Fn(&AgentMessage) + Send + Sync + 'static) -> &Self {
        self.core.on_message(handler);
        self
    }

    /// Register a handler invoked for every end-of-turn `result`.
    pub fn on_result(&self, handler: impl Fn(&ResultMessage) + Send + Sync + 'static) -> &Self {
        self.core.on_result(handler);
        self
    }

    /// Connect without a prompt.
    ///
    /// # Errors
    ///
    /// [`AgentError::TransportUnavailable`] or state errors.
    pub async fn connect(&self) -> Result<(), AgentError> {
        Arc::clone(&self.core).connect(None).await
    }

    /// Attach to an agent over arbitrary byte streams instead of spawning a
    /// process.
    ///
    /// # Errors
    ///
    /// State errors on misuse.
    pub async fn connect_io(
        &self,
        reader: impl tokio::io::AsyncRead + Send + Unpin + 'static,
        writer: impl tokio::io::AsyncWrite + Send + Unpin + 'static,
    ) -> Result<(), AgentError> {
        Arc::clone(&self.core).connect_io(reader, writer, None).await
    }

    /// First turn: connect and send `prompt` lazily, on subscription.
    #[must_use]
    pub fn connect_turn(&self, prompt: &str) -> TurnSpec {
        TurnSpec::new(Arc::clone(&self.core), prompt, true)
    }

    /// Next turn: send `prompt` lazily, on subscription. The session must
    /// be connected by the time a producer is polled.
    #[must_use]
    pub fn turn(&self, prompt: &str) -> TurnSpec {
        TurnSpec::new(Arc::clone(&self.core), prompt, false)
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

    /// Close the session. Idempotent.
    ///
    /// # Errors
    ///
    /// I/O errors from process teardown.
    pub async fn close(&self) -> Result<(), AgentError> {
        self.core.close().await
    }
}

/// One turn's lazy producers.
///
/// Subscribing to any of them takes the turn slot, sends the query if it
/// has not been sent yet, streams until the turn's `result`, and completes.
/// A second subscription on the same spec supersedes the first (the slot is
/// single-occupancy) but never re-sends the query.
pub struct TurnSpec {
    core: Arc<SessionCore>,
    prompt: String,
    connect_first: bool,
    sent: Arc<AtomicBool>,
}

impl TurnSpec {
    fn new(core: Arc<SessionCore>, prompt: &str, connect_first: bool) -> Self {
        Self {
            core,
            prompt: prompt.to_string(),
            connect_first,
            sent: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Begin the turn: subscribe first so no message is missed, then send.
    async fn begin(
        core: Arc<SessionCore>,
        prompt: String,
        connect_first: bool,
        sent: Arc<AtomicBool>,
    ) -> Result<UnboundedReceiverStream<Result<AgentMessage, AgentError>>, AgentError> {
        if connect_first && !core.is_connected() {
            Arc::clone(&core).connect(None).await?;
        }

        let rx = core.subscribe_turn();
        if !sent.swap(true, Ordering::SeqCst) {
            core.send_user_message(&prompt).await?;
        }
        Ok(UnboundedReceiverStream::new(rx))
    }

    /// Every regular message for this turn, completing at the `result`.
    #[must_use]
    pub fn messages(&self) -> BoxStream<'static, Result<AgentMessage, AgentError>> {
        let core = Arc::clone(&self.core);
        let prompt = self.prompt.clone();
        let connect_first = self.connect_first;
        let sent = Arc::clone(&self.sent);

        futures_util::stream::once(async move {
            match Self::begin(core, prompt, connect_first, sent).await {
                Ok(stream) => stream.boxed(),
                Err(e) => futures_util::stream::iter(vec![Err(e)]).boxed(),
            }
        })
        .flatten()
        .boxed()
    }

    /// Assistant text fragments as they arrive, one item per assistant
    /// message.
    #[must_use]
    pub fn text_stream(&self) -> impl Stream<Item = Result<String, AgentError>> + Send + 'static {
        self.messages().filter_map(|item| async move {
            match item {
                Ok(AgentMessage::Assistant(assistant)) => {
                    let text = assistant.text();
                    (!text.is_empty()).then_some(Ok(text))
                }
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            }
        })
    }

    /// All assistant text for the turn, joined.
    ///
    /// # Errors
    ///
    /// Any error the turn stream surfaces: state errors at subscription,
    /// `transport-terminated` mid-turn.
    pub async fn text(&self) -> Result<String, AgentError> {
        let mut stream = self.text_stream().boxed();
        let mut collected = String::new();
        while let Some(item) = stream.next().await {
            collected.push_str(&item?);
        }
        Ok(collected)
    }
}
