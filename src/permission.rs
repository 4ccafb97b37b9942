//! Tool permission decision point.
//!
//! When the process asks `can_use_tool`, the session consults the single
//! caller-registered callback. No callback means allow. A failing callback
//! denies with an explanatory message rather than tearing anything down.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AgentError;

/// Context passed to the permission callback alongside the tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolPermissionContext {
    /// Suggestions the process attached to the request, verbatim.
    pub suggestions: Option<Value>,
    /// Path the process flagged as blocked, if any.
    pub blocked_path: Option<String>,
    /// Identifier of the originating control request.
    pub request_id: String,
}

/// Outcome of a permission check.
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionDecision {
    /// Allow the tool call, optionally rewriting its input.
    Allow {
        /// Replacement input; `None` keeps the original.
        updated_input: Option<Value>,
    },
    /// Deny the tool call, optionally explaining why.
    Deny {
        /// Message surfaced to the model.
        message: Option<String>,
    },
}

impl PermissionDecision {
    /// Allow unchanged.
    #[must_use]
    pub fn allow() -> Self {
        Self::Allow {
            updated_input: None,
        }
    }

    /// Allow with a rewritten input object.
    #[must_use]
    pub fn allow_with_input(input: Value) -> Self {
        Self::Allow {
            updated_input: Some(input),
        }
    }

    /// Deny with a message.
    #[must_use]
    pub fn deny(message: impl Into<String>) -> Self {
        Self::Deny {
            message: Some(message.into()),
        }
    }

    /// The wire payload for the `can_use_tool` response.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Allow { updated_input } => {
                let mut payload = serde_json::json!({"behavior": "allow"});
                if let Some(input) = updated_input {
                    payload["updatedInput"] = input.clone();
                }
                payload
            }
            Self::Deny { message } => {
                let mut payload = serde_json::json!({"behavior": "deny"});
                if let Some(message) = message {
                    payload["message"] = Value::String(message.clone());
                }
                payload
            }
        }
    }
}

/// Caller-registered permission callback.
#[async_trait]
pub trait ToolPermissionCallback: Send + Sync {
    /// Decide whether `tool_name` may run with `input`.
    ///
    /// # Errors
    ///
    /// An error here is converted to a deny decision with the error message;
    /// the session continues.
    async fn check_permission(
        &self,
        tool_name: &str,
        input: &Value,
        context: &ToolPermissionContext,
    ) -> Result<PermissionDecision, AgentError>;
}

/// Adapter turning a plain closure into a [`ToolPermissionCallback`].
pub struct PermissionFn<F>(pub F);

#[async_trait]
impl<F> ToolPermissionCallback for PermissionFn<F>
where
    F: Fn(&str, &Value, &ToolPermissionContext) -> PermissionDecision + Send + Sync,
{
    async fn check_permission(
        &self,
        tool_name: &str,
        input: &Value,
        context: &ToolPermissionContext,
    ) -> Result<PermissionDecision, AgentError> {
        Ok((self.0)(tool_name, input, context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_wire_shape() {
        let payload = PermissionDecision::allow().to_wire();
        assert_eq!(payload, serde_json::json!({"behavior": "allow"}));
    }

    #[test]
    fn allow_with_updated_input_wire_shape() {
        let payload =
            PermissionDecision::allow_with_input(serde_json::json!({"command": "ls -l"}))
                .to_wire();
        assert_eq!(payload["behavior"], "allow");
        assert_eq!(payload["updatedInput"]["command"], "ls -l");
    }

    #[test]
    fn deny_wire_shape() {
        let payload = PermissionDecision::deny("system dir").to_wire();
        assert_eq!(payload["behavior"], "deny");
        assert_eq!(payload["message"], "system dir");
    }

    #[tokio::test]
    async fn closure_adapter() {
        let callback = PermissionFn(|tool: &str, _input: &Value, _ctx: &ToolPermissionContext| {
            if tool == "Bash" {
                PermissionDecision::deny("no shell")
            } else {
                PermissionDecision::allow()
            }
        });

        let ctx = ToolPermissionContext::default();
        let decision = callback
            .check_permission("Bash", &Value::Null, &ctx)
            .await
            .unwrap();
        assert_eq!(decision, PermissionDecision::deny("no shell"));
    }
}
