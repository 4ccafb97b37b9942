//! Session engine shared by every caller-facing client.
//!
//! Owns the process, the reader task, the control correlator, and the turn
//! demultiplexer. The reader task is the only place inbound lines are
//! consumed; it never runs caller code beyond the inline cross-turn
//! handlers. Hook, permission, and MCP dispatch are offloaded to spawned
//! tasks so a handler that calls back into the session cannot deadlock the
//! reader.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::control::ControlCorrelator;
use crate::error::AgentError;
use crate::hooks::{HookInput, HookRegistry};
use crate::mcp::McpDispatcher;
use crate::options::{AgentOptions, McpServerConfig};
use crate::permission::{PermissionDecision, ToolPermissionCallback, ToolPermissionContext};
use crate::process::AgentProcess;
use crate::session::demux::{TurnDemux, TurnItem};
use crate::transport::{spawn_stderr_drain, OutboundWriter};
use crate::wire::control::{
    ControlRequestPayload, InboundControlRequest, OutboundControlRequest,
    OutboundControlResponse,
};
use crate::wire::message::{AgentMessage, ResultMessage};
use crate::wire::parse::{FrameParser, InboundFrame, ParseError};

/// Session identifier used until the process assigns one.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Grace period between SIGTERM and SIGKILL on teardown.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(5);

type MessageHandler = Arc<dyn Fn(&AgentMessage) + Send + Sync>;
type ResultHandler = Arc<dyn Fn(&ResultMessage) + Send + Sync>;

/// Shared session state and machinery.
pub struct SessionCore {
    options: AgentOptions,
    connected: AtomicBool,
    closed: AtomicBool,
    writer: Mutex<Option<OutboundWriter>>,
    correlator: ControlCorrelator,
    demux: TurnDemux,
    raw: Mutex<Option<mpsc::UnboundedSender<InboundFrame>>>,
    hooks: Arc<HookRegistry>,
    permission: Mutex<Option<Arc<dyn ToolPermissionCallback>>>,
    mcp: Arc<McpDispatcher>,
    session_id: Mutex<String>,
    current_model: Mutex<Option<String>>,
    current_permission_mode: Mutex<Option<String>>,
    server_info: Mutex<Option<Value>>,
    on_message: Mutex<Vec<MessageHandler>>,
    on_result: Mutex<Vec<ResultHandler>>,
    process: tokio::sync::Mutex<Option<AgentProcess>>,
    cancel: CancellationToken,
}

impl SessionCore {
    /// Create a session around an options record. In-process MCP servers
    /// from the options are registered with the dispatcher immediately.
    #[must_use]
    pub fn new(options: AgentOptions) -> Arc<Self> {
        let mcp = Arc::new(McpDispatcher::new());
        for (name, config) in options.mcp_servers() {
            if let McpServerConfig::InProcess { handler } = config {
                mcp.register(name.clone(), handler.clone());
            }
        }

        let current_model = options.model.clone();
        let current_permission_mode = options.permission_mode.map(|m| m.as_str().to_string());

        Arc::new(Self {
            options,
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            writer: Mutex::new(None),
            correlator: ControlCorrelator::new(),
            demux: TurnDemux::new(),
            raw: Mutex::new(None),
            hooks: Arc::new(HookRegistry::new()),
            permission: Mutex::new(None),
            mcp,
            session_id: Mutex::new(DEFAULT_SESSION_ID.to_string()),
            current_model: Mutex::new(current_model),
            current_permission_mode: Mutex::new(current_permission_mode),
            server_info: Mutex::new(None),
            on_message: Mutex::new(Vec::new()),
            on_result: Mutex::new(Vec::new()),
            process: tokio::sync::Mutex::new(None),
            cancel: CancellationToken::new(),
        })
    }

    /// The hook registry for this session. Register hooks before connecting
    /// so they are advertised in the `initialize` handshake.
    #[must_use]
    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// Install the tool permission callback.
    pub fn set_permission_callback(&self, callback: Arc<dyn ToolPermissionCallback>) {
        self.permission
            .lock()
            .expect("permission lock poisoned")
            .replace(callback);
    }

    /// Register a cross-turn message handler, invoked inline on the
    /// dispatch path before turn delivery. Keep it fast.
    pub fn on_message(&self, handler: impl Fn(&AgentMessage) + Send + Sync + 'static) {
        self.on_message
            .lock()
            .expect("handler lock poisoned")
            .push(Arc::new(handler));
    }

    /// Register a cross-turn result handler.
    pub fn on_result(&self, handler: impl Fn(&ResultMessage) + Send + Sync + 'static) {
        self.on_result
            .lock()
            .expect("handler lock poisoned")
            .push(Arc::new(handler));
    }

    /// Spawn the process and start the session.
    ///
    /// # Errors
    ///
    /// [`AgentError::Closed`] / [`AgentError::AlreadyConnected`] on state
    /// misuse, [`AgentError::TransportUnavailable`] when the binary cannot
    /// be launched, and any failure of the `initialize` handshake.
    pub async fn connect(
        self: Arc<Self>,
        initial_prompt: Option<&str>,
    ) -> Result<(), AgentError> {
        self.begin_connect()?;

        let mut process = match AgentProcess::spawn(&self.options) {
            Ok(process) => process,
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                return Err(AgentError::TransportUnavailable(e.to_string()));
            }
        };

        let stdin = process.take_stdin().ok_or_else(|| {
            AgentError::TransportUnavailable("process stdin not piped".to_string())
        })?;
        let stdout = process.take_stdout().ok_or_else(|| {
            AgentError::TransportUnavailable("process stdout not piped".to_string())
        })?;
        if let Some(stderr) = process.take_stderr() {
            spawn_stderr_drain(stderr);
        }
        *self.process.lock().await = Some(process);

        Self::start_io(&self, stdout, stdin);
        self.finish_connect(initial_prompt).await
    }

    /// Attach to an agent over arbitrary byte streams instead of spawning a
    /// process: an agent behind a socket, or a scripted double in tests.
    ///
    /// # Errors
    ///
    /// Same state errors as [`SessionCore::connect`].
    pub async fn connect_io(
        self: Arc<Self>,
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
        initial_prompt: Option<&str>,
    ) -> Result<(), AgentError> {
        self.begin_connect()?;
        Self::start_io(&self, reader, writer);
        self.finish_connect(initial_prompt).await
    }

    fn begin_connect(&self) -> Result<(), AgentError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AgentError::Closed);
        }
        if self.connected.swap(true, Ordering::SeqCst) {
            return Err(AgentError::AlreadyConnected);
        }
        Ok(())
    }

    fn start_io(
        core: &Arc<Self>,
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) {
        core.writer
            .lock()
            .expect("writer lock poisoned")
            .replace(OutboundWriter::new(writer));

        let core = Arc::clone(core);
        tokio::spawn(async move {
            core.reader_loop(reader).await;
        });
    }

    async fn finish_connect(&self, initial_prompt: Option<&str>) -> Result<(), AgentError> {
        // Advertise hooks iff any are registered; silence otherwise.
        if !self.hooks.is_empty() {
            let hooks = self.hooks.build_configuration();
            self.correlator
                .request(
                    &self.writer_handle()?,
                    OutboundControlRequest::Initialize { hooks },
                    self.options.operation_timeout(),
                )
                .await?;
            tracing::debug!("hook configuration advertised");
        }

        if let Some(prompt) = initial_prompt {
            self.send_user_message(prompt).await?;
        }

        tracing::info!("session connected");
        Ok(())
    }

    async fn reader_loop(self: Arc<Self>, reader: impl AsyncRead + Send + Unpin + 'static) {
        let mut lines = BufReader::new(reader).lines();

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    tracing::debug!("reader cancelled");
                    return;
                }

                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => Self::handle_line(&self, &line),
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!(error = %e, "reader I/O error");
                            break;
                        }
                    }
                }
            }
        }

        self.handle_transport_end().await;
    }

    /// Classify and dispatch one stdout line. Runs on the reader; must not
    /// block on caller code.
    fn handle_line(core: &Arc<Self>, line: &str) {
        if line.trim().is_empty() {
            return;
        }

        let frame = match FrameParser::parse_line(line) {
            Ok(frame) => frame,
            Err(ParseError::InvalidJson { reason, .. }) => {
                // Diagnostic noise interleaved on stdout; never fatal.
                tracing::warn!(reason = %reason, line = %line, "skipping non-JSON line");
                return;
            }
            Err(e @ ParseError::Malformed { .. }) => {
                tracing::warn!(error = %e, line = %line, "skipping malformed frame");
                return;
            }
        };

        if let Some(raw) = core.raw.lock().expect("raw lock poisoned").as_ref() {
            let _ = raw.send(frame.clone());
        }

        match frame {
            InboundFrame::Data(message) => core.handle_data(message),
            InboundFrame::ControlRequest(request) => {
                let core = Arc::clone(core);
                tokio::spawn(async move {
                    core.handle_control_request(request).await;
                });
            }
            InboundFrame::ControlResponse(response) => {
                core.correlator.resolve(response);
            }
        }
    }

    fn handle_data(&self, message: AgentMessage) {
        if let Some(session_id) = message.session_id() {
            let mut current = self.session_id.lock().expect("session id lock poisoned");
            if *current != session_id {
                tracing::debug!(session_id, "session id updated");
                *current = session_id.to_string();
            }
        }
        if let AgentMessage::System(system) = &message {
            if let Some(model) = &system.model {
                self.current_model
                    .lock()
                    .expect("model lock poisoned")
                    .replace(model.clone());
            }
        }

        let handlers: Vec<MessageHandler> = self
            .on_message
            .lock()
            .expect("handler lock poisoned")
            .clone();
        for handler in handlers {
            handler(&message);
        }
        if let AgentMessage::Result(result) = &message {
            let handlers: Vec<ResultHandler> = self
                .on_result
                .lock()
                .expect("handler lock poisoned")
                .clone();
            for handler in handlers {
                handler(result);
            }
        }

        self.demux.dispatch(message);
    }

    /// Handle one process-initiated control request on a worker task and
    /// send the reply. Handler failures become error responses; the session
    /// continues.
    async fn handle_control_request(self: Arc<Self>, request: InboundControlRequest) {
        let request_id = request.request_id.clone();
        let subtype = request.payload.subtype().to_string();

        let response = match request.payload {
            ControlRequestPayload::Initialize { payload } => {
                self.server_info
                    .lock()
                    .expect("server info lock poisoned")
                    .replace(payload);
                OutboundControlResponse::success(
                    &request_id,
                    serde_json::json!({"status": "ok"}),
                )
            }
            ControlRequestPayload::HookCallback {
                callback_id, input, ..
            } => {
                let input = HookInput::from_value(input);
                match self.hooks.dispatch(&callback_id, input).await {
                    Ok(output) => {
                        OutboundControlResponse::success(&request_id, output.to_wire())
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, callback_id = %callback_id, "hook dispatch failed");
                        OutboundControlResponse::error(&request_id, e.to_string())
                    }
                }
            }
            ControlRequestPayload::CanUseTool {
                tool_name,
                input,
                permission_suggestions,
                blocked_path,
            } => {
                let decision = self
                    .check_permission(
                        &tool_name,
                        &input,
                        permission_suggestions,
                        blocked_path,
                        &request_id,
                    )
                    .await;
                OutboundControlResponse::success(&request_id, decision.to_wire())
            }
            ControlRequestPayload::McpMessage {
                server_name,
                message,
            } => match self.mcp.dispatch(&server_name, message).await {
                Ok(payload) => OutboundControlResponse::success(&request_id, payload),
                Err(e) => {
                    tracing::warn!(error = %e, server = %server_name, "MCP dispatch failed");
                    OutboundControlResponse::error(&request_id, e.to_string())
                }
            },
            ControlRequestPayload::Other { subtype, .. } => {
                tracing::debug!(subtype = %subtype, "acknowledging unknown control subtype");
                OutboundControlResponse::success(&request_id, serde_json::json!({}))
            }
        };

        let writer = match self.writer_handle() {
            Ok(writer) => writer,
            Err(_) => return,
        };
        if let Err(e) = writer.write_line(&response.to_envelope()).await {
            tracing::warn!(error = %e, subtype = %subtype, "failed to send control response");
        }
    }

    async fn check_permission(
        &self,
        tool_name: &str,
        input: &Value,
        suggestions: Option<Value>,
        blocked_path: Option<String>,
        request_id: &str,
    ) -> PermissionDecision {
        let callback = self
            .permission
            .lock()
            .expect("permission lock poisoned")
            .clone();

        let Some(callback) = callback else {
            return PermissionDecision::allow();
        };

        let context = ToolPermissionContext {
            suggestions,
            blocked_path,
            request_id: request_id.to_string(),
        };

        match callback.check_permission(tool_name, input, &context).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(error = %e, tool = tool_name, "permission callback failed");
                PermissionDecision::deny(format!("permission callback error: {e}"))
            }
        }
    }

    /// The process ended its stdout stream: either an orderly close (flag
    /// already set) or an unexpected death that fails all pending work.
    async fn handle_transport_end(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.connected.store(false, Ordering::SeqCst);

        let exit_code = {
            let mut guard = self.process.lock().await;
            match guard.as_mut() {
                Some(process) => match process.wait().await {
                    Ok(status) => status.code(),
                    Err(_) => None,
                },
                None => None,
            }
        };

        tracing::warn!(?exit_code, "agent process terminated unexpectedly");

        self.correlator.fail_all(|| AgentError::ClosedWhilePending);
        self.demux
            .fail(|| AgentError::TransportTerminated { exit_code });
        self.raw.lock().expect("raw lock poisoned").take();
    }

    /// Send one user message carrying the current session identifier.
    ///
    /// # Errors
    ///
    /// State errors when not connected; write errors from the transport.
    pub async fn send_user_message(&self, prompt: &str) -> Result<(), AgentError> {
        self.ensure_connected()?;

        let message = serde_json::json!({
            "type": "user",
            "message": {"role": "user", "content": prompt},
            "parent_tool_use_id": null,
            "session_id": self.session_id(),
        });

        self.writer_handle()?.write_line(&message).await?;
        tracing::debug!(session_id = %self.session_id(), "user message sent");
        Ok(())
    }

    /// Caller-initiated interrupt.
    ///
    /// # Errors
    ///
    /// State errors, `control-timeout`, or `control-error`.
    pub async fn interrupt(&self) -> Result<(), AgentError> {
        self.ensure_connected()?;
        self.correlator
            .request(
                &self.writer_handle()?,
                OutboundControlRequest::Interrupt,
                self.options.operation_timeout(),
            )
            .await?;
        Ok(())
    }

    /// Change the permission mode mid-session.
    ///
    /// # Errors
    ///
    /// State errors, `control-timeout`, or `control-error`.
    pub async fn set_permission_mode(&self, mode: &str) -> Result<(), AgentError> {
        self.ensure_connected()?;
        self.correlator
            .request(
                &self.writer_handle()?,
                OutboundControlRequest::SetPermissionMode {
                    mode: mode.to_string(),
                },
                self.options.operation_timeout(),
            )
            .await?;
        self.current_permission_mode
            .lock()
            .expect("permission mode lock poisoned")
            .replace(mode.to_string());
        Ok(())
    }

    /// Switch models mid-session.
    ///
    /// # Errors
    ///
    /// State errors, `control-timeout`, or `control-error`.
    pub async fn set_model(&self, model: &str) -> Result<(), AgentError> {
        self.ensure_connected()?;
        self.correlator
            .request(
                &self.writer_handle()?,
                OutboundControlRequest::SetModel {
                    model: model.to_string(),
                },
                self.options.operation_timeout(),
            )
            .await?;
        self.current_model
            .lock()
            .expect("model lock poisoned")
            .replace(model.to_string());
        Ok(())
    }

    /// Install a fresh per-turn subscriber.
    pub fn subscribe_turn(&self) -> mpsc::UnboundedReceiver<TurnItem> {
        self.demux.subscribe_turn()
    }

    /// Install the session-lifetime subscriber.
    pub fn subscribe_all(&self) -> mpsc::UnboundedReceiver<TurnItem> {
        self.demux.subscribe_all()
    }

    /// Install the raw tap receiving every parsed frame, control traffic
    /// included.
    pub fn subscribe_raw(&self) -> mpsc::UnboundedReceiver<InboundFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.raw.lock().expect("raw lock poisoned").replace(tx);
        rx
    }

    /// Returns true while the session can exchange messages.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    /// The current session identifier.
    #[must_use]
    pub fn session_id(&self) -> String {
        self.session_id
            .lock()
            .expect("session id lock poisoned")
            .clone()
    }

    /// The model currently in effect, if known.
    #[must_use]
    pub fn current_model(&self) -> Option<String> {
        self.current_model.lock().expect("model lock poisoned").clone()
    }

    /// The permission mode currently in effect, if known.
    #[must_use]
    pub fn current_permission_mode(&self) -> Option<String> {
        self.current_permission_mode
            .lock()
            .expect("permission mode lock poisoned")
            .clone()
    }

    /// Process metadata captured from its `initialize` control request.
    #[must_use]
    pub fn server_info(&self) -> Option<Value> {
        self.server_info
            .lock()
            .expect("server info lock poisoned")
            .clone()
    }

    fn ensure_connected(&self) -> Result<(), AgentError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AgentError::Closed);
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(AgentError::NotConnected);
        }
        Ok(())
    }

    fn writer_handle(&self) -> Result<OutboundWriter, AgentError> {
        self.writer
            .lock()
            .expect("writer lock poisoned")
            .clone()
            .ok_or(AgentError::NotConnected)
    }

    /// Close the session: terminate the process, fail pending control
    /// requests with `closed-while-pending`, and complete every subscriber.
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// I/O errors from process teardown.
    pub async fn close(&self) -> Result<(), AgentError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.connected.store(false, Ordering::SeqCst);
        self.cancel.cancel();

        // Teardown ordering: signal, close stdin so the process can drain,
        // wait out the grace period, force-kill, reap.
        let writer = self.writer.lock().expect("writer lock poisoned").take();
        {
            let mut guard = self.process.lock().await;
            if let Some(process) = guard.as_mut() {
                process.signal_terminate();
                if let Some(writer) = &writer {
                    writer.shutdown().await;
                }
                process.terminate(TERMINATE_GRACE).await?;
            } else if let Some(writer) = &writer {
                writer.shutdown().await;
            }
            guard.take();
        }

        self.correlator.fail_all(|| AgentError::ClosedWhilePending);
        self.demux.complete();
        self.raw.lock().expect("raw lock poisoned").take();

        tracing::info!("session closed");
        Ok(())
    }
}
