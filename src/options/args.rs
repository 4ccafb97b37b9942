//! Argument-vector encoding.
//!
//! Translates an [`AgentOptions`] record into the argument vector for the
//! agent process. Three framing arguments are always present: streaming JSON
//! on stdout, streaming JSON on stdin, and verbose mode; everything else is
//! derived from the options record.

use serde_json::{Map, Value};

use super::{AgentOptions, McpServerConfig, PermissionMode};

impl AgentOptions {
    /// Build the full argument vector for the process.
    #[must_use]
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--input-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
        ];

        if let Some(model) = &self.model {
            push_pair(&mut args, "--model", model);
        }
        if let Some(model) = &self.fallback_model {
            push_pair(&mut args, "--fallback-model", model);
        }
        if let Some(prompt) = &self.system_prompt {
            push_pair(&mut args, "--system-prompt", prompt);
        }
        if let Some(prompt) = &self.append_system_prompt {
            push_pair(&mut args, "--append-system-prompt", prompt);
        }

        // An explicitly empty base tool set still emits the flag: the empty
        // string means "disable all tools".
        if let Some(tools) = &self.tools {
            push_pair(&mut args, "--tools", &tools.join(","));
        }
        if !self.allowed_tools.is_empty() {
            push_pair(&mut args, "--allowedTools", &self.allowed_tools.join(","));
        }
        if !self.disallowed_tools.is_empty() {
            push_pair(
                &mut args,
                "--disallowedTools",
                &self.disallowed_tools.join(","),
            );
        }

        match self.permission_mode {
            Some(PermissionMode::DangerouslySkipPermissions) => {
                args.push("--dangerously-skip-permissions".to_string());
            }
            Some(mode) => push_pair(&mut args, "--permission-mode", mode.as_str()),
            None => {}
        }
        if let Some(name) = &self.permission_prompt_tool_name {
            push_pair(&mut args, "--permission-prompt-tool", name);
        }

        if let Some(turns) = self.max_turns {
            push_pair(&mut args, "--max-turns", &turns.to_string());
        }
        if let Some(budget) = self.max_budget_usd {
            push_pair(&mut args, "--max-budget-usd", &budget.to_string());
        }
        if let Some(tokens) = self.max_thinking_tokens {
            push_pair(&mut args, "--max-thinking-tokens", &tokens.to_string());
        }

        if let Some(schema) = &self.json_schema {
            push_pair(&mut args, "--json-schema", &schema.to_string());
        }
        if let Some(agents) = &self.agents {
            if !agents.is_empty() {
                push_pair(&mut args, "--agents", agents);
            }
        }

        if let Some(config) = self.mcp_config_json() {
            push_pair(&mut args, "--mcp-config", &config);
        }

        for dir in &self.add_dirs {
            push_pair(&mut args, "--add-dir", &dir.display().to_string());
        }
        for plugin in &self.plugins {
            push_pair(&mut args, "--plugin-dir", &plugin.path().display().to_string());
        }

        if let Some(settings) = &self.settings {
            push_pair(&mut args, "--settings", settings);
        }
        if !self.setting_sources.is_empty() {
            push_pair(
                &mut args,
                "--setting-sources",
                &self.setting_sources.join(","),
            );
        }

        if self.continue_conversation {
            args.push("--continue".to_string());
        }
        if let Some(session_id) = &self.resume {
            push_pair(&mut args, "--resume", session_id);
        }
        if self.fork_session {
            args.push("--fork-session".to_string());
        }
        if self.include_partial_messages {
            args.push("--include-partial-messages".to_string());
        }

        for (name, value) in &self.extra_args {
            args.push(format!("--{name}"));
            if let Some(value) = value {
                args.push(value.clone());
            }
        }

        args
    }

    /// Serialize external MCP server entries for `--mcp-config`.
    ///
    /// In-process servers are handled by the session's MCP dispatcher and
    /// never appear here. Returns `None` when there is nothing external.
    #[must_use]
    pub fn mcp_config_json(&self) -> Option<String> {
        let mut servers = Map::new();
        for (name, config) in &self.mcp_servers {
            let entry = match config {
                McpServerConfig::Stdio { command, args, env } => {
                    let mut map = Map::new();
                    map.insert("type".into(), "stdio".into());
                    map.insert("command".into(), command.clone().into());
                    if !args.is_empty() {
                        map.insert("args".into(), serde_json::to_value(args).ok()?);
                    }
                    if !env.is_empty() {
                        map.insert("env".into(), serde_json::to_value(env).ok()?);
                    }
                    Value::Object(map)
                }
                McpServerConfig::Http { url, headers } => {
                    let mut map = Map::new();
                    map.insert("type".into(), "http".into());
                    map.insert("url".into(), url.clone().into());
                    if !headers.is_empty() {
                        map.insert("headers".into(), serde_json::to_value(headers).ok()?);
                    }
                    Value::Object(map)
                }
                McpServerConfig::InProcess { .. } => continue,
            };
            servers.insert(name.clone(), entry);
        }

        if servers.is_empty() {
            return None;
        }

        Some(serde_json::json!({ "mcpServers": servers }).to_string())
    }
}

fn push_pair(args: &mut Vec<String>, flag: &str, value: &str) {
    args.push(flag.to_string());
    args.push(value.to_string());
}
