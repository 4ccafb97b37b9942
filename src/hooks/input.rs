//! Hook input variants.

use serde_json::Value;

/// Input delivered to a hook callback, matching the subtype of the
/// process's hook-callback request.
#[derive(Debug, Clone, PartialEq)]
pub enum HookInput {
    /// A tool is about to run.
    PreToolUse {
        tool_name: String,
        tool_input: Value,
        tool_use_id: Option<String>,
    },
    /// A tool finished running.
    PostToolUse {
        tool_name: String,
        tool_response: Value,
        tool_use_id: Option<String>,
    },
    /// Any other hook kind, forwarded as the raw payload.
    Other {
        event_name: String,
        payload: Value,
    },
}

impl HookInput {
    /// Decode the `input` object of a hook-callback control request,
    /// classified by its `hook_event_name`.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let event_name = value
            .get("hook_event_name")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        let tool_name = value.get("tool_name").and_then(Value::as_str);
        let tool_use_id = value
            .get("tool_use_id")
            .and_then(Value::as_str)
            .map(String::from);

        match (event_name.as_str(), tool_name) {
            ("PreToolUse", Some(tool_name)) => Self::PreToolUse {
                tool_name: tool_name.to_string(),
                tool_input: value.get("tool_input").cloned().unwrap_or(Value::Null),
                tool_use_id,
            },
            ("PostToolUse", Some(tool_name)) => Self::PostToolUse {
                tool_name: tool_name.to_string(),
                tool_response: value.get("tool_response").cloned().unwrap_or(Value::Null),
                tool_use_id,
            },
            _ => Self::Other {
                event_name,
                payload: value,
            },
        }
    }

    /// The tool name, for the tool-scoped variants.
    #[must_use]
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            Self::PreToolUse { tool_name, .. } | Self::PostToolUse { tool_name, .. } => {
                Some(tool_name)
            }
            Self::Other { payload, .. } => payload.get("tool_name").and_then(Value::as_str),
        }
    }

    /// The hook event name on the wire.
    #[must_use]
    pub fn event_name(&self) -> &str {
        match self {
            Self::PreToolUse { .. } => "PreToolUse",
            Self::PostToolUse { .. } => "PostToolUse",
            Self::Other { event_name, .. } => event_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_pre_tool_use() {
        let input = HookInput::from_value(serde_json::json!({
            "hook_event_name": "PreToolUse",
            "tool_name": "Bash",
            "tool_input": {"command": "ls -la"},
            "tool_use_id": "toolu_1"
        }));

        match input {
            HookInput::PreToolUse {
                tool_name,
                tool_input,
                tool_use_id,
            } => {
                assert_eq!(tool_name, "Bash");
                assert_eq!(tool_input["command"], "ls -la");
                assert_eq!(tool_use_id.as_deref(), Some("toolu_1"));
            }
            other => panic!("expected PreToolUse, got {other:?}"),
        }
    }

    #[test]
    fn decode_post_tool_use() {
        let input = HookInput::from_value(serde_json::json!({
            "hook_event_name": "PostToolUse",
            "tool_name": "Read",
            "tool_response": {"content": "file contents"}
        }));

        assert_eq!(input.event_name(), "PostToolUse");
        assert_eq!(input.tool_name(), Some("Read"));
    }

    #[test]
    fn unknown_event_preserved_as_other() {
        let input = HookInput::from_value(serde_json::json!({
            "hook_event_name": "SessionStart",
            "source": "startup"
        }));

        match &input {
            HookInput::Other {
                event_name,
                payload,
            } => {
                assert_eq!(event_name, "SessionStart");
                assert_eq!(payload["source"], "startup");
            }
            other => panic!("expected Other, got {other:?}"),
        }
        assert!(input.tool_name().is_none());
    }
}
