//! One-shot queries.
//!
//! Spawns a process, sends exactly one prompt, collects every message up to
//! the `result`, closes, and hands back the whole exchange. No inter-turn
//! state is retained; for conversations use [`crate::session::AgentClient`]
//! or [`crate::session::ReactiveClient`].

use futures_util::StreamExt;
use serde_json::Value;

use crate::error::AgentError;
use crate::options::AgentOptions;
use crate::session::AgentClient;
use crate::wire::message::{AgentMessage, ResultMessage};

/// Outcome classification for a one-shot query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    /// At least one assistant message arrived and the result was not an
    /// error.
    Success,
    /// The turn finished but produced no assistant content.
    Partial,
    /// The result was flagged as an error, or no messages arrived at all.
    Error,
}

/// Metadata extracted from the turn's `result` message.
#[derive(Debug, Clone, Default)]
pub struct QueryMetadata {
    /// Model the query ran on, if known.
    pub model: Option<String>,
    /// Session identifier assigned by the process.
    pub session_id: Option<String>,
    /// Number of agentic turns consumed.
    pub num_turns: Option<u32>,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: Option<u64>,
    /// Time spent in API calls in milliseconds.
    pub duration_api_ms: Option<u64>,
    /// Total cost in USD.
    pub total_cost_usd: Option<f64>,
    /// Token usage counters, shape defined by the process.
    pub usage: Option<Value>,
}

impl QueryMetadata {
    fn from_result(result: &ResultMessage, model: Option<&str>) -> Self {
        Self {
            model: model.map(String::from),
            session_id: result.session_id.clone(),
            num_turns: result.num_turns,
            duration_ms: result.duration_ms,
            duration_api_ms: result.duration_api_ms,
            total_cost_usd: result.total_cost_usd,
            usage: result.usage.clone(),
        }
    }
}

/// Everything a one-shot query produced.
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// Outcome classification.
    pub status: ResultStatus,
    /// Every message of the turn, in arrival order.
    pub messages: Vec<AgentMessage>,
    /// Metadata from the `result` message.
    pub metadata: QueryMetadata,
}

impl QueryResult {
    /// Concatenated text of all assistant text blocks.
    #[must_use]
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .map(AgentMessage::text)
            .collect::<Vec<_>>()
            .concat()
    }

    /// The turn's `result` message, when one arrived.
    #[must_use]
    pub fn result_message(&self) -> Option<&ResultMessage> {
        self.messages.iter().find_map(|m| match m {
            AgentMessage::Result(result) => Some(result),
            _ => None,
        })
    }

    /// Structured output from the `result` message, when requested via a
    /// JSON schema.
    #[must_use]
    pub fn structured_output(&self) -> Option<&Value> {
        self.result_message()
            .and_then(|r| r.structured_output.as_ref())
    }
}

/// Execute one prompt and return the full result.
///
/// Bounded overall by the options' operation timeout.
///
/// # Errors
///
/// [`AgentError::TransportUnavailable`] when the process cannot be
/// launched, [`AgentError::ControlTimeout`] when the turn outlives the
/// operation timeout, [`AgentError::TransportTerminated`] when the process
/// dies mid-turn.
pub async fn execute(prompt: &str, options: AgentOptions) -> Result<QueryResult, AgentError> {
    let timeout = options.operation_timeout();
    let client = AgentClient::new(options);
    client.connect().await?;

    let outcome = tokio::time::timeout(timeout, run_turn(&client, prompt)).await;
    let close_result = client.close().await;

    match outcome {
        Ok(result) => {
            close_result?;
            result
        }
        Err(_) => Err(AgentError::ControlTimeout {
            subtype: "query".to_string(),
        }),
    }
}

/// Execute one prompt and return just the concatenated assistant text.
///
/// # Errors
///
/// Same as [`execute`].
pub async fn text(prompt: &str, options: AgentOptions) -> Result<String, AgentError> {
    Ok(execute(prompt, options).await?.text())
}

async fn run_turn(client: &AgentClient, prompt: &str) -> Result<QueryResult, AgentError> {
    let mut stream = client.receive_response();
    client.query(prompt).await?;

    let mut messages = Vec::new();
    while let Some(item) = stream.next().await {
        messages.push(item?);
    }

    let model = client.current_model();
    Ok(build_result(messages, model.as_deref()))
}

fn build_result(messages: Vec<AgentMessage>, model: Option<&str>) -> QueryResult {
    let result_message = messages.iter().find_map(|m| match m {
        AgentMessage::Result(result) => Some(result.clone()),
        _ => None,
    });

    let status = match &result_message {
        Some(result) if result.is_error => ResultStatus::Error,
        _ if messages.is_empty() => ResultStatus::Error,
        _ if messages
            .iter()
            .any(|m| matches!(m, AgentMessage::Assistant(_))) =>
        {
            ResultStatus::Success
        }
        _ => ResultStatus::Partial,
    };

    let metadata = result_message
        .as_ref()
        .map(|r| QueryMetadata::from_result(r, model))
        .unwrap_or_default();

    QueryResult {
        status,
        messages,
        metadata,
    }
}
