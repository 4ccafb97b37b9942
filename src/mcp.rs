//! In-process MCP server dispatch.
//!
//! The process can route MCP traffic for a named server back to the caller
//! instead of spawning an external server. The caller supplies a handler;
//! what it does with the messages is its own concern.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AgentError;

/// Handler for `mcp_message` control requests addressed to one named
/// in-process server.
#[async_trait]
pub trait McpMessageHandler: Send + Sync {
    /// Handle one MCP message and produce the reply payload.
    ///
    /// # Errors
    ///
    /// Errors are reported back to the process as control-plane error
    /// payloads; they never terminate the session.
    async fn handle(&self, message: Value) -> Result<Value, AgentError>;
}

/// Routes `mcp_message` control requests to registered handlers by server
/// name.
#[derive(Default)]
pub struct McpDispatcher {
    servers: RwLock<HashMap<String, Arc<dyn McpMessageHandler>>>,
}

impl McpDispatcher {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a server name. Replaces any previous
    /// registration for that name.
    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn McpMessageHandler>) {
        let name = name.into();
        tracing::debug!(server = %name, "registered in-process MCP server");
        self.servers
            .write()
            .expect("mcp registry lock poisoned")
            .insert(name, handler);
    }

    /// Returns true if a handler is registered under `name`.
    #[must_use]
    pub fn has_server(&self, name: &str) -> bool {
        self.servers
            .read()
            .expect("mcp registry lock poisoned")
            .contains_key(name)
    }

    /// Forward `message` to the named server and wrap its reply in the
    /// `mcp_response` envelope expected by the process.
    ///
    /// # Errors
    ///
    /// [`AgentError::CallbackError`] when the server is unknown or its
    /// handler fails.
    pub async fn dispatch(&self, server_name: &str, message: Value) -> Result<Value, AgentError> {
        let handler = {
            let servers = self.servers.read().expect("mcp registry lock poisoned");
            servers.get(server_name).cloned()
        };

        let Some(handler) = handler else {
            return Err(AgentError::CallbackError(format!(
                "unknown MCP server: {server_name}"
            )));
        };

        let response = handler
            .handle(message)
            .await
            .map_err(|e| AgentError::CallbackError(format!("MCP handler failed: {e}")))?;

        Ok(serde_json::json!({ "mcp_response": response }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl McpMessageHandler for Echo {
        async fn handle(&self, message: Value) -> Result<Value, AgentError> {
            Ok(serde_json::json!({"echo": message}))
        }
    }

    struct Failing;

    #[async_trait]
    impl McpMessageHandler for Failing {
        async fn handle(&self, _message: Value) -> Result<Value, AgentError> {
            Err(AgentError::CallbackError("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn dispatch_wraps_reply() {
        let dispatcher = McpDispatcher::new();
        dispatcher.register("tools", Arc::new(Echo));

        let reply = dispatcher
            .dispatch("tools", serde_json::json!({"method": "tools/list"}))
            .await
            .unwrap();
        assert_eq!(reply["mcp_response"]["echo"]["method"], "tools/list");
    }

    #[tokio::test]
    async fn unknown_server_is_callback_error() {
        let dispatcher = McpDispatcher::new();
        let err = dispatcher
            .dispatch("missing", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::CallbackError(_)));
        assert!(err.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn handler_failure_is_callback_error() {
        let dispatcher = McpDispatcher::new();
        dispatcher.register("tools", Arc::new(Failing));

        let err = dispatcher.dispatch("tools", Value::Null).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn registration_is_replaceable() {
        let dispatcher = McpDispatcher::new();
        dispatcher.register("tools", Arc::new(Failing));
        dispatcher.register("tools", Arc::new(Echo));

        assert!(dispatcher.has_server("tools"));
        let reply = dispatcher
            .dispatch("tools", serde_json::json!(1))
            .await
            .unwrap();
        assert_eq!(reply["mcp_response"]["echo"], 1);
    }
}
