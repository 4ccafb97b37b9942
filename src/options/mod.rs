//! Session configuration.
//!
//! [`AgentOptions`] is built once, before connect, and is immutable
//! afterwards. It covers everything that shapes the spawned process: model
//! selection, prompts, tool filters, permission mode, budgets, session
//! lineage, MCP servers, and the escape-hatch `extra_args`.

mod args;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::mcp::McpMessageHandler;

/// Default timeout applied to each caller-initiated control request and to
/// one-shot queries overall.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(600);

/// Permission mode for tool execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionMode {
    /// Normal interactive permission checks.
    Default,
    /// Automatically accept file edits.
    AcceptEdits,
    /// Plan mode.
    Plan,
    /// Bypass permission prompts.
    BypassPermissions,
    /// Skip the permission system entirely. Maps to a dedicated flag rather
    /// than `--permission-mode`.
    DangerouslySkipPermissions,
}

impl PermissionMode {
    /// The wire value passed to `--permission-mode`.
    ///
    /// [`PermissionMode::DangerouslySkipPermissions`] has no wire value; it
    /// is expressed as its own flag.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AcceptEdits => "acceptEdits",
            Self::Plan => "plan",
            Self::BypassPermissions => "bypassPermissions",
            Self::DangerouslySkipPermissions => "dangerouslySkipPermissions",
        }
    }
}

/// Configuration for one MCP server.
#[derive(Clone)]
pub enum McpServerConfig {
    /// External server spawned by the process over stdio.
    Stdio {
        command: String,
        args: Vec<String>,
        env: BTreeMap<String, String>,
    },
    /// External server reached over HTTP/SSE.
    Http {
        url: String,
        headers: BTreeMap<String, String>,
    },
    /// In-process server: `mcp_message` control requests for this name are
    /// forwarded to the handler instead of an external process.
    InProcess { handler: Arc<dyn McpMessageHandler> },
}

impl std::fmt::Debug for McpServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio { command, args, .. } => f
                .debug_struct("Stdio")
                .field("command", command)
                .field("args", args)
                .finish_non_exhaustive(),
            Self::Http { url, .. } => {
                f.debug_struct("Http").field("url", url).finish_non_exhaustive()
            }
            Self::InProcess { .. } => f.debug_struct("InProcess").finish_non_exhaustive(),
        }
    }
}

impl McpServerConfig {
    /// Returns true for configurations serialized into `--mcp-config`.
    /// In-process servers are registered with the session instead.
    #[must_use]
    pub fn is_external(&self) -> bool {
        !matches!(self, Self::InProcess { .. })
    }
}

/// A plugin made available to the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    path: PathBuf,
}

impl PluginConfig {
    /// A plugin loaded from a local directory.
    #[must_use]
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The plugin directory path.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

/// Immutable session configuration. Build with [`AgentOptions::builder`].
#[derive(Debug, Clone, Default)]
pub struct AgentOptions {
    pub(crate) model: Option<String>,
    pub(crate) fallback_model: Option<String>,
    pub(crate) system_prompt: Option<String>,
    pub(crate) append_system_prompt: Option<String>,
    pub(crate) tools: Option<Vec<String>>,
    pub(crate) allowed_tools: Vec<String>,
    pub(crate) disallowed_tools: Vec<String>,
    pub(crate) permission_mode: Option<PermissionMode>,
    pub(crate) permission_prompt_tool_name: Option<String>,
    pub(crate) max_turns: Option<u32>,
    pub(crate) max_budget_usd: Option<f64>,
    pub(crate) max_tokens: Option<u32>,
    pub(crate) max_thinking_tokens: Option<u32>,
    pub(crate) resume: Option<String>,
    pub(crate) continue_conversation: bool,
    pub(crate) fork_session: bool,
    pub(crate) json_schema: Option<Value>,
    pub(crate) agents: Option<String>,
    pub(crate) mcp_servers: BTreeMap<String, McpServerConfig>,
    pub(crate) add_dirs: Vec<PathBuf>,
    pub(crate) plugins: Vec<PluginConfig>,
    pub(crate) settings: Option<String>,
    pub(crate) setting_sources: Vec<String>,
    pub(crate) include_partial_messages: bool,
    pub(crate) extra_args: BTreeMap<String, Option<String>>,
    pub(crate) working_dir: Option<PathBuf>,
    pub(crate) binary_path: Option<PathBuf>,
    pub(crate) env: BTreeMap<String, String>,
    pub(crate) operation_timeout: Duration,
}

impl AgentOptions {
    /// Start building an options record.
    #[must_use]
    pub fn builder() -> AgentOptionsBuilder {
        AgentOptionsBuilder::default()
    }

    /// The configured model, if any.
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// The configured permission mode, if any.
    #[must_use]
    pub fn permission_mode(&self) -> Option<PermissionMode> {
        self.permission_mode
    }

    /// Operation timeout for control requests and one-shot queries.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        if self.operation_timeout.is_zero() {
            DEFAULT_OPERATION_TIMEOUT
        } else {
            self.operation_timeout
        }
    }

    /// Working directory for the spawned process.
    #[must_use]
    pub fn working_dir(&self) -> Option<&std::path::Path> {
        self.working_dir.as_deref()
    }

    /// MCP server configurations, by name.
    #[must_use]
    pub fn mcp_servers(&self) -> &BTreeMap<String, McpServerConfig> {
        &self.mcp_servers
    }
}

/// Builder for [`AgentOptions`].
#[derive(Debug, Clone, Default)]
pub struct AgentOptionsBuilder {
    options: AgentOptions,
}

impl AgentOptionsBuilder {
    /// Set the model (e.g. "claude-sonnet-4-5").
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.options.model = Some(model.into());
        self
    }

    /// Set the fallback model used when the primary is overloaded.
    #[must_use]
    pub fn fallback_model(mut self, model: impl Into<String>) -> Self {
        self.options.fallback_model = Some(model.into());
        self
    }

    /// Replace the default system prompt.
    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.options.system_prompt = Some(prompt.into());
        self
    }

    /// Append to the default system prompt.
    #[must_use]
    pub fn append_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.options.append_system_prompt = Some(prompt.into());
        self
    }

    /// Set the base tool set. An empty list disables all tools.
    #[must_use]
    pub fn tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.options.tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    /// Whitelist of allowed tools.
    #[must_use]
    pub fn allowed_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.options.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Blacklist of disallowed tools.
    #[must_use]
    pub fn disallowed_tools(
        mut self,
        tools: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.options.disallowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Set the permission mode.
    #[must_use]
    pub fn permission_mode(mut self, mode: PermissionMode) -> Self {
        self.options.permission_mode = Some(mode);
        self
    }

    /// Name the tool the process uses to ask for permission.
    #[must_use]
    pub fn permission_prompt_tool_name(mut self, name: impl Into<String>) -> Self {
        self.options.permission_prompt_tool_name = Some(name.into());
        self
    }

    /// Maximum number of agentic turns.
    #[must_use]
    pub fn max_turns(mut self, turns: u32) -> Self {
        self.options.max_turns = Some(turns);
        self
    }

    /// Maximum spend in USD.
    #[must_use]
    pub fn max_budget_usd(mut self, budget: f64) -> Self {
        self.options.max_budget_usd = Some(budget);
        self
    }

    /// Maximum response tokens. Accepted for API parity but currently not
    /// mapped to any process argument; route it through
    /// [`extra_arg`](Self::extra_arg) if your process version supports one.
    #[must_use]
    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.options.max_tokens = Some(tokens);
        self
    }

    /// Maximum extended-thinking tokens.
    #[must_use]
    pub fn max_thinking_tokens(mut self, tokens: u32) -> Self {
        self.options.max_thinking_tokens = Some(tokens);
        self
    }

    /// Resume a previous session by identifier.
    #[must_use]
    pub fn resume(mut self, session_id: impl Into<String>) -> Self {
        self.options.resume = Some(session_id.into());
        self
    }

    /// Continue the most recent conversation.
    #[must_use]
    pub fn continue_conversation(mut self, enabled: bool) -> Self {
        self.options.continue_conversation = enabled;
        self
    }

    /// Fork the resumed session instead of extending it.
    #[must_use]
    pub fn fork_session(mut self, enabled: bool) -> Self {
        self.options.fork_session = enabled;
        self
    }

    /// Request structured output matching a JSON schema.
    #[must_use]
    pub fn json_schema(mut self, schema: Value) -> Self {
        self.options.json_schema = Some(schema);
        self
    }

    /// Pre-encoded JSON describing named sub-agent templates.
    #[must_use]
    pub fn agents(mut self, agents_json: impl Into<String>) -> Self {
        self.options.agents = Some(agents_json.into());
        self
    }

    /// Add one MCP server configuration.
    #[must_use]
    pub fn mcp_server(mut self, name: impl Into<String>, config: McpServerConfig) -> Self {
        self.options.mcp_servers.insert(name.into(), config);
        self
    }

    /// Grant the process access to an additional directory.
    #[must_use]
    pub fn add_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.add_dirs.push(dir.into());
        self
    }

    /// Add a plugin.
    #[must_use]
    pub fn plugin(mut self, plugin: PluginConfig) -> Self {
        self.options.plugins.push(plugin);
        self
    }

    /// Path to a settings file.
    #[must_use]
    pub fn settings(mut self, path: impl Into<String>) -> Self {
        self.options.settings = Some(path.into());
        self
    }

    /// Settings source precedence list.
    #[must_use]
    pub fn setting_sources(
        mut self,
        sources: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.options.setting_sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Receive partial `stream_event` messages.
    #[must_use]
    pub fn include_partial_messages(mut self, enabled: bool) -> Self {
        self.options.include_partial_messages = enabled;
        self
    }

    /// Escape hatch: pass `--{name} {value}`, or a bare `--{name}` when the
    /// value is `None`.
    #[must_use]
    pub fn extra_arg(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        self.options.extra_args.insert(name.into(), value);
        self
    }

    /// Working directory for the spawned process.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.working_dir = Some(dir.into());
        self
    }

    /// Explicit path to the agent binary. Overrides both the `CLAUDE_CLI_PATH`
    /// environment variable and search-path resolution.
    #[must_use]
    pub fn binary_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.binary_path = Some(path.into());
        self
    }

    /// Additional environment variable for the spawned process.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.env.insert(key.into(), value.into());
        self
    }

    /// Timeout for each caller-initiated control request and for one-shot
    /// queries overall. Defaults to ten minutes.
    #[must_use]
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.options.operation_timeout = timeout;
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(mut self) -> AgentOptions {
        if self.options.operation_timeout.is_zero() {
            self.options.operation_timeout = DEFAULT_OPERATION_TIMEOUT;
        }
        self.options
    }
}
