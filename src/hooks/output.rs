//! Hook output and its wire encoding.

use serde_json::Value;

/// Result of a hook callback.
///
/// `continue_execution` defaults to true; everything else is optional. For
/// permission hooks, the nested [`HookSpecificOutput`] carries the decision
/// and an optional rewritten tool input.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HookOutput {
    /// Whether the process should continue. `false` blocks the operation.
    pub continue_execution: Option<bool>,
    /// Free-form decision string (e.g. "block").
    pub decision: Option<String>,
    /// Human-readable reason attached to the decision.
    pub reason: Option<String>,
    /// Hook-kind-specific fields.
    pub specific: Option<HookSpecificOutput>,
}

/// Permission-hook-specific output fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HookSpecificOutput {
    /// "allow", "deny", or "ask".
    pub permission_decision: Option<String>,
    /// Reason attached to the permission decision.
    pub permission_decision_reason: Option<String>,
    /// Replacement tool input applied before execution proceeds.
    pub updated_input: Option<Value>,
}

impl HookOutput {
    /// Let the operation proceed.
    #[must_use]
    pub fn allow() -> Self {
        Self::default()
    }

    /// Block the operation with a reason.
    #[must_use]
    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            continue_execution: Some(false),
            decision: Some("block".to_string()),
            reason: Some(reason.into()),
            specific: None,
        }
    }

    /// Allow the operation but replace the tool input.
    #[must_use]
    pub fn with_updated_input(input: Value) -> Self {
        Self {
            specific: Some(HookSpecificOutput {
                permission_decision: Some("allow".to_string()),
                updated_input: Some(input),
                ..HookSpecificOutput::default()
            }),
            ..Self::default()
        }
    }

    /// Effective continue flag (defaults to true).
    #[must_use]
    pub fn continues(&self) -> bool {
        self.continue_execution.unwrap_or(true)
    }

    /// Encode into the hook-callback response payload.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        let mut payload = serde_json::Map::new();
        payload.insert("continue".to_string(), self.continues().into());
        if let Some(decision) = &self.decision {
            payload.insert("decision".to_string(), decision.clone().into());
        }
        if let Some(reason) = &self.reason {
            payload.insert("reason".to_string(), reason.clone().into());
        }
        if let Some(specific) = &self.specific {
            if let Some(decision) = &specific.permission_decision {
                payload.insert("permission_decision".to_string(), decision.clone().into());
            }
            if let Some(reason) = &specific.permission_decision_reason {
                payload.insert(
                    "permission_decision_reason".to_string(),
                    reason.clone().into(),
                );
            }
            if let Some(input) = &specific.updated_input {
                payload.insert("updated_input".to_string(), input.clone());
            }
        }
        Value::Object(payload)
    }

    /// Merge outputs from multiple matching registrations, applied in
    /// registration order: any blocked output blocks, the last rewritten
    /// input wins, the last stated reason wins.
    #[must_use]
    pub fn merge(outputs: Vec<HookOutput>) -> Self {
        let mut merged = Self::allow();
        for output in outputs {
            if !output.continues() {
                merged.continue_execution = Some(false);
            }
            if output.decision.is_some() {
                merged.decision = output.decision;
            }
            if output.reason.is_some() {
                merged.reason = output.reason;
            }
            if let Some(specific) = output.specific {
                let target = merged.specific.get_or_insert_with(HookSpecificOutput::default);
                if specific.permission_decision.is_some() {
                    target.permission_decision = specific.permission_decision;
                }
                if specific.permission_decision_reason.is_some() {
                    target.permission_decision_reason = specific.permission_decision_reason;
                }
                if specific.updated_input.is_some() {
                    target.updated_input = specific.updated_input;
                }
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_wire_shape() {
        let payload = HookOutput::allow().to_wire();
        assert_eq!(payload, serde_json::json!({"continue": true}));
    }

    #[test]
    fn block_wire_shape() {
        let payload = HookOutput::block("dangerous command").to_wire();
        assert_eq!(payload["continue"], false);
        assert_eq!(payload["decision"], "block");
        assert_eq!(payload["reason"], "dangerous command");
    }

    #[test]
    fn updated_input_wire_shape() {
        let payload =
            HookOutput::with_updated_input(serde_json::json!({"command": "ls"})).to_wire();
        assert_eq!(payload["continue"], true);
        assert_eq!(payload["permission_decision"], "allow");
        assert_eq!(payload["updated_input"]["command"], "ls");
    }

    #[test]
    fn merge_block_wins() {
        let merged = HookOutput::merge(vec![
            HookOutput::allow(),
            HookOutput::block("no"),
            HookOutput::allow(),
        ]);
        assert!(!merged.continues());
        assert_eq!(merged.reason.as_deref(), Some("no"));
    }

    #[test]
    fn merge_last_updated_input_wins() {
        let merged = HookOutput::merge(vec![
            HookOutput::with_updated_input(serde_json::json!({"v": 1})),
            HookOutput::with_updated_input(serde_json::json!({"v": 2})),
        ]);
        let specific = merged.specific.unwrap();
        assert_eq!(specific.updated_input.unwrap()["v"], 2);
    }

    #[test]
    fn merge_last_reason_wins() {
        let merged = HookOutput::merge(vec![
            HookOutput::block("first"),
            HookOutput::block("second"),
        ]);
        assert_eq!(merged.reason.as_deref(), Some("second"));
    }

    #[test]
    fn merge_of_nothing_allows() {
        let merged = HookOutput::merge(Vec::new());
        assert!(merged.continues());
        assert_eq!(merged.to_wire(), serde_json::json!({"continue": true}));
    }
}
