//! Shared test harness: a scripted agent double wired to a session over
//! in-memory pipes.
#![allow(dead_code)]

use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc;

use claude_agent_client::session::AgentClient;

/// A scripted stand-in for the agent process.
///
/// `emit` writes lines the session will read as the process's stdout;
/// `recv` yields each JSON object the session wrote to the process's stdin.
/// Dropping the emitter (via [`FakeAgent::hang_up`]) closes stdout, which
/// the session treats as unexpected process death.
pub struct FakeAgent {
    outgoing: Option<mpsc::UnboundedSender<String>>,
    incoming: mpsc::UnboundedReceiver<Value>,
}

impl FakeAgent {
    /// Wire a client to a fake agent and connect it.
    ///
    /// With `auto_ack` set, every caller-initiated `control_request` is
    /// answered with an empty success payload, so `connect` with hooks and
    /// control operations complete. Replies the session sends for
    /// agent-initiated requests are never acked; they surface via `recv`.
    pub async fn connect(client: &AgentClient, auto_ack: bool) -> Self {
        let (agent, reader, writer) = Self::endpoints(auto_ack);
        client.connect_io(reader, writer).await.expect("connect_io");
        agent
    }

    /// Build the fake agent plus the byte streams to hand to `connect_io`.
    /// The responder tasks start immediately, so an `initialize` handshake
    /// sent during connect is answered even before the caller regains
    /// control.
    pub fn endpoints(auto_ack: bool) -> (Self, DuplexStream, DuplexStream) {
        let (client_reader, mut agent_stdout) = tokio::io::duplex(1 << 16);
        let (agent_stdin, client_writer) = tokio::io::duplex(1 << 16);

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(line) = out_rx.recv().await {
                if agent_stdout.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if agent_stdout.write_all(b"\n").await.is_err() {
                    break;
                }
            }
            // Dropping agent_stdout here closes the session's reader.
        });

        let (in_tx, in_rx) = mpsc::unbounded_channel::<Value>();
        // Only hold a second stdout sender when acking, so `hang_up` can
        // close stdout by dropping the last sender.
        let ack_tx = auto_ack.then(|| out_tx.clone());
        tokio::spawn(async move {
            let mut lines = BufReader::new(agent_stdin).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let Ok(value) = serde_json::from_str::<Value>(&line) else {
                    continue;
                };
                if value["type"] == "control_request" {
                    if let Some(ack_tx) = &ack_tx {
                        let ack = serde_json::json!({
                            "type": "control_response",
                            "response": {
                                "subtype": "success",
                                "request_id": value["request_id"],
                                "response": {}
                            }
                        });
                        let _ = ack_tx.send(ack.to_string());
                    }
                }
                let _ = in_tx.send(value);
            }
        });

        let agent = Self {
            outgoing: Some(out_tx),
            incoming: in_rx,
        };
        (agent, client_reader, client_writer)
    }

    /// Emit one JSON object as a stdout line.
    pub fn emit(&self, value: Value) {
        self.outgoing
            .as_ref()
            .expect("agent already hung up")
            .send(value.to_string())
            .expect("emit");
    }

    /// Emit a raw line (possibly not JSON).
    pub fn emit_raw(&self, line: &str) {
        self.outgoing
            .as_ref()
            .expect("agent already hung up")
            .send(line.to_string())
            .expect("emit_raw");
    }

    /// Next object the session wrote, within a deadline.
    pub async fn recv(&mut self) -> Value {
        tokio::time::timeout(Duration::from_secs(5), self.incoming.recv())
            .await
            .expect("timed out waiting for session output")
            .expect("session stdin closed")
    }

    /// Close the fake agent's stdout, simulating process death.
    pub fn hang_up(&mut self) {
        self.outgoing.take();
    }
}

/// A `system` init message.
pub fn system_init(session_id: &str) -> Value {
    serde_json::json!({
        "type": "system",
        "subtype": "init",
        "session_id": session_id,
        "cwd": "/tmp",
        "model": "claude-sonnet-4-5",
        "tools": ["Bash", "Read", "Write"]
    })
}

/// An `assistant` message with one text block.
pub fn assistant_text(session_id: &str, text: &str) -> Value {
    serde_json::json!({
        "type": "assistant",
        "message": {"role": "assistant", "content": [{"type": "text", "text": text}]},
        "session_id": session_id
    })
}

/// A successful `result` message.
pub fn result_success(session_id: &str, num_turns: u32) -> Value {
    serde_json::json!({
        "type": "result",
        "subtype": "success",
        "is_error": false,
        "num_turns": num_turns,
        "session_id": session_id,
        "duration_ms": 1200,
        "duration_api_ms": 800,
        "total_cost_usd": 0.003,
        "usage": {"input_tokens": 10, "output_tokens": 20}
    })
}
