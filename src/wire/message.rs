//! Data-plane message types.
//!
//! These are the conversation messages the agent process emits on stdout in
//! stream-json mode: `system`, `assistant`, `user`, `result`, and (with
//! partial messages enabled) `stream_event`. Unknown message types and
//! unknown fields are preserved rather than dropped, so the library keeps
//! working against newer process versions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A data-plane message from the agent process.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentMessage {
    /// System status message; the first one of a session carries the
    /// session identifier and process metadata.
    System(SystemMessage),
    /// Assistant output with ordered content blocks.
    Assistant(AssistantMessage),
    /// User-side message, typically carrying tool results.
    User(UserMessage),
    /// End-of-turn marker with cost and usage metadata.
    Result(ResultMessage),
    /// Partial streaming event (emitted with `--include-partial-messages`).
    StreamEvent(StreamEvent),
    /// Message type unknown to this version; the full JSON is preserved.
    Other(Value),
}

impl AgentMessage {
    /// Returns the session identifier carried by this message, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::System(msg) => msg.session_id.as_deref(),
            Self::Assistant(msg) => msg.session_id.as_deref(),
            Self::User(msg) => msg.session_id.as_deref(),
            Self::Result(msg) => msg.session_id.as_deref(),
            Self::StreamEvent(msg) => msg.session_id.as_deref(),
            Self::Other(value) => value.get("session_id").and_then(Value::as_str),
        }
    }

    /// Returns true if this is the end-of-turn `result` message.
    #[must_use]
    pub fn is_result(&self) -> bool {
        matches!(self, Self::Result(_))
    }

    /// Concatenated text of all `text` content blocks, for assistant
    /// messages. Empty for everything else.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Assistant(msg) => msg.text(),
            _ => String::new(),
        }
    }
}

/// System status message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SystemMessage {
    /// Message subtype (e.g. "init").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// Session identifier assigned by the process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Working directory reported by the process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Model in use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Tools available in this session.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    /// Permission mode in effect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_mode: Option<String>,
    /// Every field this version does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Assistant message: an ordered list of content blocks plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// The inner API message (role, content blocks, model).
    pub message: MessageBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AssistantMessage {
    /// Concatenated text of all `text` content blocks.
    #[must_use]
    pub fn text(&self) -> String {
        self.message
            .content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect()
    }

    /// All `tool_use` blocks in order.
    #[must_use]
    pub fn tool_uses(&self) -> Vec<&ContentBlock> {
        self.message
            .content
            .iter()
            .filter(|block| matches!(block, ContentBlock::ToolUse { .. }))
            .collect()
    }
}

/// Inner message body shared by assistant and user messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MessageBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One content block inside an assistant or user message.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    /// Plain text.
    Text {
        text: String,
    },
    /// A tool invocation requested by the model.
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    /// Extended-thinking content.
    Thinking {
        thinking: String,
        signature: Option<String>,
    },
    /// A tool result keyed by its originating tool-use identifier.
    ToolResult {
        tool_use_id: String,
        content: Value,
        is_error: Option<bool>,
    },
    /// Block type unknown to this version; preserved verbatim.
    Other(Value),
}

impl ContentBlock {
    /// Returns the text if this is a text block.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Returns the tool name if this is a tool-use block.
    #[must_use]
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            Self::ToolUse { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl Serialize for ContentBlock {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let value = match self {
            Self::Text { text } => serde_json::json!({"type": "text", "text": text}),
            Self::ToolUse { id, name, input } => {
                serde_json::json!({"type": "tool_use", "id": id, "name": name, "input": input})
            }
            Self::Thinking {
                thinking,
                signature,
            } => {
                let mut map = Map::new();
                map.insert("type".into(), "thinking".into());
                map.insert("thinking".into(), thinking.clone().into());
                if let Some(signature) = signature {
                    map.insert("signature".into(), signature.clone().into());
                }
                Value::Object(map)
            }
            Self::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                let mut map = Map::new();
                map.insert("type".into(), "tool_result".into());
                map.insert("tool_use_id".into(), tool_use_id.clone().into());
                map.insert("content".into(), content.clone());
                if let Some(is_error) = is_error {
                    map.insert("is_error".into(), (*is_error).into());
                }
                Value::Object(map)
            }
            Self::Other(value) => value.clone(),
        };
        value.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ContentBlock {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let block_type = value.get("type").and_then(Value::as_str).unwrap_or("");

        match block_type {
            "text" => Ok(Self::Text {
                text: value
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            "tool_use" => Ok(Self::ToolUse {
                id: value
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                name: value
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                input: value.get("input").cloned().unwrap_or(Value::Null),
            }),
            "thinking" => Ok(Self::Thinking {
                thinking: value
                    .get("thinking")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                signature: value
                    .get("signature")
                    .and_then(Value::as_str)
                    .map(String::from),
            }),
            "tool_result" => Ok(Self::ToolResult {
                tool_use_id: value
                    .get("tool_use_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                content: value.get("content").cloned().unwrap_or(Value::Null),
                is_error: value.get("is_error").and_then(Value::as_bool),
            }),
            _ => Ok(Self::Other(value)),
        }
    }
}

/// User-side message. The inner payload is kept flexible because the process
/// emits several shapes here (tool results, synthesized user turns).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub message: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserMessage {
    /// Tool-result blocks carried by this message, keyed by tool-use id.
    #[must_use]
    pub fn tool_results(&self) -> Vec<&Value> {
        self.message
            .get("content")
            .and_then(Value::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|block| {
                        block.get("type").and_then(Value::as_str) == Some("tool_result")
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// End-of-turn marker.
///
/// Every field the process puts on the wire is parsed; losing one silently
/// breaks callers that need cost or structured-output data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ResultMessage {
    /// Result subtype (e.g. "success", "error_max_turns").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// Total wall-clock duration of the turn in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Time spent in API calls in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_api_ms: Option<u64>,
    /// Whether the turn ended in error.
    #[serde(default)]
    pub is_error: bool,
    /// Number of agentic turns consumed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_turns: Option<u32>,
    /// Session identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Total cost in USD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    /// Token usage counters, shape defined by the process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
    /// Final textual result, when the process produces one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Structured output matching the caller's JSON schema, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_output: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Partial streaming event wrapping a raw API delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// The raw streaming event from the underlying API.
    pub event: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Serialize for AgentMessage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        fn tagged<T: Serialize>(inner: &T, tag: &str) -> Result<Value, serde_json::Error> {
            let mut value = serde_json::to_value(inner)?;
            if let Value::Object(ref mut map) = value {
                map.insert("type".to_string(), Value::String(tag.to_string()));
            }
            Ok(value)
        }

        let value = match self {
            Self::System(inner) => tagged(inner, "system"),
            Self::Assistant(inner) => tagged(inner, "assistant"),
            Self::User(inner) => tagged(inner, "user"),
            Self::Result(inner) => tagged(inner, "result"),
            Self::StreamEvent(inner) => tagged(inner, "stream_event"),
            Self::Other(value) => Ok(value.clone()),
        }
        .map_err(serde::ser::Error::custom)?;
        value.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AgentMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl AgentMessage {
    /// Classify a JSON object by its `type` field.
    ///
    /// Unknown types are preserved as [`AgentMessage::Other`] rather than
    /// rejected.
    ///
    /// # Errors
    ///
    /// Returns an error when a recognized type fails to parse (e.g. an
    /// `assistant` message without an inner `message` object).
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let message_type = value.get("type").and_then(Value::as_str).unwrap_or("");

        match message_type {
            "system" => Ok(Self::System(serde_json::from_value(value)?)),
            "assistant" => Ok(Self::Assistant(serde_json::from_value(value)?)),
            "user" => Ok(Self::User(serde_json::from_value(value)?)),
            "result" => Ok(Self::Result(serde_json::from_value(value)?)),
            "stream_event" => Ok(Self::StreamEvent(serde_json::from_value(value)?)),
            _ => Ok(Self::Other(value)),
        }
    }
}
