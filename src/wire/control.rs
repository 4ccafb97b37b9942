//! Control-plane envelope types.
//!
//! The control plane is interleaved with the data plane on the same
//! stdin/stdout line streams. Requests flow in both directions:
//!
//! - The process asks the caller to decide or compute something
//!   (`hook_callback`, `can_use_tool`, `initialize`, `mcp_message`); the
//!   caller replies with a `control_response`.
//! - The caller drives the session (`initialize`, `interrupt`,
//!   `set_permission_mode`, `set_model`); the process replies with a
//!   `control_response` correlated by `request_id`.

use serde_json::{Map, Value};

/// A control request sent by the process to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundControlRequest {
    /// Correlation identifier chosen by the process; echoed in the reply.
    pub request_id: String,
    /// The decoded request payload.
    pub payload: ControlRequestPayload,
}

/// Payload of a process-initiated control request, classified by `subtype`.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlRequestPayload {
    /// Execute a registered hook callback.
    HookCallback {
        callback_id: String,
        input: Value,
        tool_use_id: Option<String>,
    },
    /// Ask whether a tool may be used with the given input.
    CanUseTool {
        tool_name: String,
        input: Value,
        permission_suggestions: Option<Value>,
        blocked_path: Option<String>,
    },
    /// Process handshake carrying its capabilities.
    Initialize { payload: Value },
    /// Message for an in-process MCP server.
    McpMessage { server_name: String, message: Value },
    /// Subtype unknown to this version; preserved verbatim.
    Other { subtype: String, payload: Value },
}

impl ControlRequestPayload {
    /// Wire subtype of this payload.
    #[must_use]
    pub fn subtype(&self) -> &str {
        match self {
            Self::HookCallback { .. } => "hook_callback",
            Self::CanUseTool { .. } => "can_use_tool",
            Self::Initialize { .. } => "initialize",
            Self::McpMessage { .. } => "mcp_message",
            Self::Other { subtype, .. } => subtype,
        }
    }
}

impl InboundControlRequest {
    /// Decode the `control_request` envelope from a parsed JSON object.
    ///
    /// # Errors
    ///
    /// Returns a message describing the missing field when the envelope has
    /// no `request_id` or a known subtype lacks a required field.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let request_id = value
            .get("request_id")
            .and_then(Value::as_str)
            .ok_or("control_request without request_id")?
            .to_string();

        let request = value
            .get("request")
            .ok_or("control_request without request body")?;
        let subtype = request.get("subtype").and_then(Value::as_str).unwrap_or("");

        let payload = match subtype {
            "hook_callback" => ControlRequestPayload::HookCallback {
                callback_id: request
                    .get("callback_id")
                    .and_then(Value::as_str)
                    .ok_or("hook_callback without callback_id")?
                    .to_string(),
                input: request.get("input").cloned().unwrap_or(Value::Null),
                tool_use_id: request
                    .get("tool_use_id")
                    .and_then(Value::as_str)
                    .map(String::from),
            },
            "can_use_tool" => ControlRequestPayload::CanUseTool {
                tool_name: request
                    .get("tool_name")
                    .and_then(Value::as_str)
                    .ok_or("can_use_tool without tool_name")?
                    .to_string(),
                input: request.get("input").cloned().unwrap_or(Value::Null),
                permission_suggestions: request.get("permission_suggestions").cloned(),
                blocked_path: request
                    .get("blocked_path")
                    .and_then(Value::as_str)
                    .map(String::from),
            },
            "initialize" => ControlRequestPayload::Initialize {
                payload: request.clone(),
            },
            "mcp_message" => ControlRequestPayload::McpMessage {
                server_name: request
                    .get("server_name")
                    .and_then(Value::as_str)
                    .ok_or("mcp_message without server_name")?
                    .to_string(),
                message: request.get("message").cloned().unwrap_or(Value::Null),
            },
            other => ControlRequestPayload::Other {
                subtype: other.to_string(),
                payload: request.clone(),
            },
        };

        Ok(Self {
            request_id,
            payload,
        })
    }
}

/// A control response from the process for a caller-initiated request.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundControlResponse {
    /// Identifier of the request this resolves.
    pub request_id: String,
    /// Success payload or error message.
    pub outcome: ControlOutcome,
}

/// Outcome carried by an inbound control response.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlOutcome {
    /// The request succeeded; the payload shape depends on the subtype.
    Success(Value),
    /// The process reported an error.
    Error(String),
}

impl InboundControlResponse {
    /// Decode a `control_response` envelope.
    ///
    /// The request identifier is accepted either at the top level or nested
    /// inside `response`; both placements exist in the wild.
    ///
    /// # Errors
    ///
    /// Returns a message when no request identifier can be found.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let response = value.get("response");

        let request_id = value
            .get("request_id")
            .or_else(|| response.and_then(|r| r.get("request_id")))
            .and_then(Value::as_str)
            .ok_or("control_response without request_id")?
            .to_string();

        let subtype = response
            .and_then(|r| r.get("subtype"))
            .and_then(Value::as_str);
        let error = value
            .get("error")
            .or_else(|| response.and_then(|r| r.get("error")))
            .filter(|e| !e.is_null());

        let outcome = if subtype == Some("error") || error.is_some() {
            let message = error
                .map(|e| match e {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| "unspecified control error".to_string());
            ControlOutcome::Error(message)
        } else {
            let payload = response
                .and_then(|r| r.get("response"))
                .cloned()
                .unwrap_or_else(|| response.cloned().unwrap_or(Value::Null));
            ControlOutcome::Success(payload)
        };

        Ok(Self {
            request_id,
            outcome,
        })
    }
}

/// A caller-initiated control request.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundControlRequest {
    /// Advertise hook configuration at session start.
    Initialize { hooks: Value },
    /// Abort the agent's current work.
    Interrupt,
    /// Change the permission mode mid-session.
    SetPermissionMode { mode: String },
    /// Switch models mid-session.
    SetModel { model: String },
}

impl OutboundControlRequest {
    /// Wire subtype of this request.
    #[must_use]
    pub fn subtype(&self) -> &'static str {
        match self {
            Self::Initialize { .. } => "initialize",
            Self::Interrupt => "interrupt",
            Self::SetPermissionMode { .. } => "set_permission_mode",
            Self::SetModel { .. } => "set_model",
        }
    }

    /// Build the full envelope for the given request identifier.
    #[must_use]
    pub fn to_envelope(&self, request_id: &str) -> Value {
        let mut request = Map::new();
        request.insert("subtype".to_string(), self.subtype().into());
        match self {
            Self::Initialize { hooks } => {
                request.insert("hooks".to_string(), hooks.clone());
            }
            Self::Interrupt => {}
            Self::SetPermissionMode { mode } => {
                request.insert("mode".to_string(), mode.clone().into());
            }
            Self::SetModel { model } => {
                request.insert("model".to_string(), model.clone().into());
            }
        }

        serde_json::json!({
            "type": "control_request",
            "request_id": request_id,
            "request": Value::Object(request),
        })
    }
}

/// A reply to a process-initiated control request.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundControlResponse {
    request_id: String,
    body: ResponseBody,
}

#[derive(Debug, Clone, PartialEq)]
enum ResponseBody {
    Success(Value),
    Error(String),
}

impl OutboundControlResponse {
    /// A successful reply carrying the handler's payload.
    #[must_use]
    pub fn success(request_id: impl Into<String>, payload: Value) -> Self {
        Self {
            request_id: request_id.into(),
            body: ResponseBody::Success(payload),
        }
    }

    /// An error reply. Handler failures are reported this way; they never
    /// tear down the session.
    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            body: ResponseBody::Error(message.into()),
        }
    }

    /// Build the wire envelope.
    #[must_use]
    pub fn to_envelope(&self) -> Value {
        let response = match &self.body {
            ResponseBody::Success(payload) => serde_json::json!({
                "subtype": "success",
                "request_id": self.request_id,
                "response": payload,
            }),
            ResponseBody::Error(message) => serde_json::json!({
                "subtype": "error",
                "request_id": self.request_id,
                "error": message,
            }),
        };

        serde_json::json!({
            "type": "control_response",
            "response": response,
        })
    }
}
