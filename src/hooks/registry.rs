//! Hook registry.
//!
//! Registrations are keyed by event kind and an optional tool-name pattern.
//! The registry is copy-on-write: dispatch snapshots the registration list
//! once per inbound callback, so registration from another thread never
//! races an in-flight dispatch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use super::input::HookInput;
use super::output::HookOutput;
use super::HookEvent;

use crate::error::AgentError;

/// Stable identifier for one hook registration, advertised to the process.
pub type HookId = String;

/// A caller-supplied hook callback.
#[async_trait]
pub trait HookCallback: Send + Sync {
    /// Execute the hook.
    ///
    /// # Errors
    ///
    /// Errors become control-plane error responses; the session continues.
    async fn on_hook(&self, input: HookInput) -> Result<HookOutput, AgentError>;
}

/// Adapter turning a plain closure into a [`HookCallback`].
pub struct HookFn<F>(pub F);

#[async_trait]
impl<F> HookCallback for HookFn<F>
where
    F: Fn(HookInput) -> HookOutput + Send + Sync,
{
    async fn on_hook(&self, input: HookInput) -> Result<HookOutput, AgentError> {
        Ok((self.0)(input))
    }
}

#[derive(Clone)]
struct Registration {
    id: HookId,
    event: HookEvent,
    pattern: Option<Regex>,
    callback: Arc<dyn HookCallback>,
}

impl Registration {
    /// Null pattern matches any tool; an input without a tool name matches
    /// only null patterns.
    fn matches(&self, tool_name: Option<&str>) -> bool {
        match (&self.pattern, tool_name) {
            (None, _) => true,
            (Some(pattern), Some(name)) => pattern.is_match(name),
            (Some(_), None) => false,
        }
    }
}

/// Holds hook registrations for one session.
#[derive(Default)]
pub struct HookRegistry {
    entries: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
}

impl HookRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for `event`, optionally restricted to tools whose
    /// name matches `pattern` (a regular expression; alternation covers
    /// multiple names). Returns the stable identifier advertised to the
    /// process.
    ///
    /// # Errors
    ///
    /// [`AgentError::CallbackError`] when the pattern is not a valid
    /// regular expression.
    pub fn register(
        &self,
        event: HookEvent,
        pattern: Option<&str>,
        callback: Arc<dyn HookCallback>,
    ) -> Result<HookId, AgentError> {
        let pattern = pattern
            .map(Regex::new)
            .transpose()
            .map_err(|e| AgentError::CallbackError(format!("invalid hook pattern: {e}")))?;

        let id = format!("hook_{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let registration = Registration {
            id: id.clone(),
            event,
            pattern,
            callback,
        };

        self.entries
            .write()
            .expect("hook registry lock poisoned")
            .push(registration);
        tracing::debug!(hook_id = %id, event = %event, "registered hook");
        Ok(id)
    }

    /// Convenience wrapper for a plain closure.
    ///
    /// # Errors
    ///
    /// Same as [`HookRegistry::register`].
    pub fn register_fn<F>(
        &self,
        event: HookEvent,
        pattern: Option<&str>,
        callback: F,
    ) -> Result<HookId, AgentError>
    where
        F: Fn(HookInput) -> HookOutput + Send + Sync + 'static,
    {
        self.register(event, pattern, Arc::new(HookFn(callback)))
    }

    /// Remove a registration. Returns false when the identifier is unknown.
    pub fn unregister(&self, id: &str) -> bool {
        let mut entries = self.entries.write().expect("hook registry lock poisoned");
        let before = entries.len();
        entries.retain(|r| r.id != id);
        entries.len() != before
    }

    /// Returns true when no hooks are registered. In that case no
    /// `initialize` advertisement is sent at session start.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries
            .read()
            .expect("hook registry lock poisoned")
            .is_empty()
    }

    /// Build the advertisement payload for the `initialize` control
    /// request: each event kind maps to its matcher entries in registration
    /// order.
    #[must_use]
    pub fn build_configuration(&self) -> Value {
        let entries = self.entries.read().expect("hook registry lock poisoned");
        let mut config = serde_json::Map::new();

        for registration in entries.iter() {
            let matchers = config
                .entry(registration.event.as_str().to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(matchers) = matchers {
                matchers.push(serde_json::json!({
                    "matcher": registration.pattern.as_ref().map(Regex::as_str),
                    "hookCallbackIds": [registration.id],
                }));
            }
        }

        Value::Object(config)
    }

    /// Execute the hook callback for a process-initiated `hook_callback`
    /// request.
    ///
    /// The identified registration anchors the dispatch; every registration
    /// for the same event whose pattern matches the input's tool name is
    /// invoked in registration order and the outputs are merged. A
    /// registration whose pattern does not match the tool name is skipped,
    /// including the identified one.
    ///
    /// # Errors
    ///
    /// [`AgentError::CallbackError`] when the identifier is unknown or a
    /// callback fails.
    pub async fn dispatch(&self, callback_id: &str, input: HookInput) -> Result<HookOutput, AgentError> {
        // Snapshot under the lock, run callbacks outside it.
        let snapshot: Vec<Registration> = {
            let entries = self.entries.read().expect("hook registry lock poisoned");
            entries.clone()
        };

        let anchor = snapshot
            .iter()
            .find(|r| r.id == callback_id)
            .ok_or_else(|| {
                AgentError::CallbackError(format!("unknown hook callback: {callback_id}"))
            })?;
        let event = anchor.event;
        let tool_name = input.tool_name().map(String::from);

        let mut outputs = Vec::new();
        for registration in snapshot
            .iter()
            .filter(|r| r.event == event && r.matches(tool_name.as_deref()))
        {
            let output = registration
                .callback
                .on_hook(input.clone())
                .await
                .map_err(|e| AgentError::CallbackError(format!("hook failed: {e}")))?;
            outputs.push(output);
        }

        if outputs.is_empty() {
            tracing::debug!(
                callback_id,
                tool = tool_name.as_deref().unwrap_or(""),
                "no hook registration matched, passing through"
            );
        }

        Ok(HookOutput::merge(outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pre_tool_use(tool: &str) -> HookInput {
        HookInput::PreToolUse {
            tool_name: tool.to_string(),
            tool_input: serde_json::json!({}),
            tool_use_id: None,
        }
    }

    #[test]
    fn register_assigns_sequential_ids() {
        let registry = HookRegistry::new();
        let a = registry
            .register_fn(HookEvent::PreToolUse, None, |_| HookOutput::allow())
            .unwrap();
        let b = registry
            .register_fn(HookEvent::PostToolUse, None, |_| HookOutput::allow())
            .unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("hook_"));
    }

    #[test]
    fn invalid_pattern_rejected() {
        let registry = HookRegistry::new();
        let result =
            registry.register_fn(HookEvent::PreToolUse, Some("("), |_| HookOutput::allow());
        assert!(matches!(result, Err(AgentError::CallbackError(_))));
    }

    #[test]
    fn unregister_removes_entry() {
        let registry = HookRegistry::new();
        let id = registry
            .register_fn(HookEvent::PreToolUse, None, |_| HookOutput::allow())
            .unwrap();

        assert!(!registry.is_empty());
        assert!(registry.unregister(&id));
        assert!(registry.is_empty());
        assert!(!registry.unregister(&id));
    }

    #[test]
    fn configuration_lists_every_registration() {
        let registry = HookRegistry::new();
        let a = registry
            .register_fn(HookEvent::PreToolUse, Some("Bash"), |_| HookOutput::allow())
            .unwrap();
        let b = registry
            .register_fn(HookEvent::PreToolUse, None, |_| HookOutput::allow())
            .unwrap();
        let c = registry
            .register_fn(HookEvent::PostToolUse, Some("Read|Write"), |_| {
                HookOutput::allow()
            })
            .unwrap();

        let config = registry.build_configuration();
        let pre = config["PreToolUse"].as_array().unwrap();
        assert_eq!(pre.len(), 2);
        assert_eq!(pre[0]["matcher"], "Bash");
        assert_eq!(pre[0]["hookCallbackIds"][0], a);
        assert!(pre[1]["matcher"].is_null());
        assert_eq!(pre[1]["hookCallbackIds"][0], b);

        let post = config["PostToolUse"].as_array().unwrap();
        assert_eq!(post[0]["matcher"], "Read|Write");
        assert_eq!(post[0]["hookCallbackIds"][0], c);
    }

    #[tokio::test]
    async fn dispatch_invokes_matching_callback() {
        let registry = HookRegistry::new();
        let id = registry
            .register_fn(HookEvent::PreToolUse, Some("Bash"), |_| {
                HookOutput::block("blocked")
            })
            .unwrap();

        let output = registry.dispatch(&id, pre_tool_use("Bash")).await.unwrap();
        assert!(!output.continues());
        assert_eq!(output.reason.as_deref(), Some("blocked"));
    }

    #[tokio::test]
    async fn dispatch_skips_on_pattern_mismatch() {
        let registry = HookRegistry::new();
        let id = registry
            .register_fn(HookEvent::PreToolUse, Some("Bash"), |_| {
                HookOutput::block("blocked")
            })
            .unwrap();

        // Same callback id, different tool: the hook must not fire.
        let output = registry.dispatch(&id, pre_tool_use("Read")).await.unwrap();
        assert!(output.continues());
        assert!(output.reason.is_none());
    }

    #[tokio::test]
    async fn dispatch_merges_all_matching_registrations() {
        let registry = HookRegistry::new();
        let id = registry
            .register_fn(HookEvent::PreToolUse, None, |_| {
                HookOutput::with_updated_input(serde_json::json!({"v": 1}))
            })
            .unwrap();
        registry
            .register_fn(HookEvent::PreToolUse, Some("Bash"), |_| {
                HookOutput::block("second says no")
            })
            .unwrap();

        let output = registry.dispatch(&id, pre_tool_use("Bash")).await.unwrap();
        assert!(!output.continues());
        assert_eq!(output.reason.as_deref(), Some("second says no"));
        let specific = output.specific.unwrap();
        assert_eq!(specific.updated_input.unwrap()["v"], 1);
    }

    #[tokio::test]
    async fn dispatch_ignores_other_events() {
        let registry = HookRegistry::new();
        let pre = registry
            .register_fn(HookEvent::PreToolUse, None, |_| HookOutput::allow())
            .unwrap();
        registry
            .register_fn(HookEvent::PostToolUse, None, |_| HookOutput::block("post"))
            .unwrap();

        let output = registry.dispatch(&pre, pre_tool_use("Bash")).await.unwrap();
        assert!(output.continues());
    }

    #[tokio::test]
    async fn unknown_callback_id_is_error() {
        let registry = HookRegistry::new();
        let err = registry
            .dispatch("hook_99", pre_tool_use("Bash"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::CallbackError(_)));
    }

    #[tokio::test]
    async fn alternated_pattern_matches_multiple_names() {
        let registry = HookRegistry::new();
        let id = registry
            .register_fn(HookEvent::PreToolUse, Some("Read|Write"), |_| {
                HookOutput::block("no file ops")
            })
            .unwrap();

        let output = registry.dispatch(&id, pre_tool_use("Write")).await.unwrap();
        assert!(!output.continues());

        let output = registry.dispatch(&id, pre_tool_use("Bash")).await.unwrap();
        assert!(output.continues());
    }
}
