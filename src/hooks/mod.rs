//! Hook registration and execution.
//!
//! Hooks are caller-supplied callbacks the process invokes at defined points
//! in its tool-execution lifecycle. Registrations are advertised to the
//! process in the caller-initiated `initialize` control request; the process
//! then calls back by stable callback identifier.

mod input;
mod output;
mod registry;

pub use input::HookInput;
pub use output::{HookOutput, HookSpecificOutput};
pub use registry::{HookCallback, HookFn, HookId, HookRegistry};

/// Lifecycle events a hook can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    /// Before a tool executes; may block or rewrite the invocation.
    PreToolUse,
    /// After a tool executes; observes the result.
    PostToolUse,
    /// When the user prompt is submitted.
    UserPromptSubmit,
    /// When the agent is about to stop.
    Stop,
    /// When a sub-agent is about to stop.
    SubagentStop,
    /// Before the conversation is compacted.
    PreCompact,
}

impl HookEvent {
    /// Wire name used in hook advertisements and callbacks.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreToolUse => "PreToolUse",
            Self::PostToolUse => "PostToolUse",
            Self::UserPromptSubmit => "UserPromptSubmit",
            Self::Stop => "Stop",
            Self::SubagentStop => "SubagentStop",
            Self::PreCompact => "PreCompact",
        }
    }
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names() {
        assert_eq!(HookEvent::PreToolUse.as_str(), "PreToolUse");
        assert_eq!(HookEvent::PostToolUse.as_str(), "PostToolUse");
        assert_eq!(HookEvent::Stop.to_string(), "Stop");
    }
}
