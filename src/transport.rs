//! Line framing over the process's standard streams.
//!
//! Outbound traffic is one JSON object per line. The stdin handle sits
//! behind an async mutex so two concurrent writers can never interleave
//! partial objects. Inbound framing is a plain buffered line reader driven
//! by the session's reader task; stderr is drained in the background and
//! surfaced only as log lines.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::error::AgentError;

/// Serialized writer over the process's stdin (or any byte sink).
///
/// Cloning is cheap; all clones share the single-flight lock.
#[derive(Clone)]
pub struct OutboundWriter {
    inner: Arc<Mutex<Option<Box<dyn AsyncWrite + Send + Unpin>>>>,
}

impl OutboundWriter {
    /// Wrap a byte sink.
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::new(writer)))),
        }
    }

    /// Serialize `value` to a single line and write it atomically.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Closed`] after [`OutboundWriter::shutdown`],
    /// serialization errors, or the underlying I/O error.
    pub async fn write_line(&self, value: &serde_json::Value) -> Result<(), AgentError> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');

        let mut guard = self.inner.lock().await;
        let writer = guard.as_mut().ok_or(AgentError::Closed)?;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Close the sink. For a process stdin this closes the pipe so the
    /// process can drain and exit; part of the teardown ordering.
    pub async fn shutdown(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(mut writer) = guard.take() {
            let _ = writer.shutdown().await;
        }
    }
}

/// Drain a stderr stream in the background, logging each line.
///
/// The reader side never blocks on stderr; diagnostics are forwarded to the
/// log and otherwise ignored.
pub fn spawn_stderr_drain(stderr: impl AsyncRead + Send + Unpin + 'static) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if !line.trim().is_empty() {
                        tracing::debug!(target: "agent_stderr", "{line}");
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(error = %e, "stderr drain ended");
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn write_line_appends_newline() {
        let (rx, tx) = tokio::io::duplex(1024);
        let writer = OutboundWriter::new(tx);

        writer
            .write_line(&serde_json::json!({"type": "user"}))
            .await
            .unwrap();
        drop(writer);

        let mut buf = String::new();
        let mut rx = rx;
        rx.read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "{\"type\":\"user\"}\n");
    }

    #[tokio::test]
    async fn concurrent_writers_never_interleave() {
        let (rx, tx) = tokio::io::duplex(64 * 1024);
        let writer = OutboundWriter::new(tx);

        let mut handles = Vec::new();
        for i in 0..50 {
            let writer = writer.clone();
            handles.push(tokio::spawn(async move {
                let payload = "x".repeat(500);
                writer
                    .write_line(&serde_json::json!({"seq": i, "payload": payload}))
                    .await
                    .unwrap();
            }));
        }

        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(rx).lines();
            let mut count = 0;
            while let Ok(Some(line)) = lines.next_line().await {
                let value: serde_json::Value = serde_json::from_str(&line).expect("whole line");
                assert_eq!(value["payload"].as_str().unwrap().len(), 500);
                count += 1;
                if count == 50 {
                    break;
                }
            }
            count
        });

        for handle in handles {
            handle.await.unwrap();
        }
        drop(writer);
        assert_eq!(reader.await.unwrap(), 50);
    }

    #[tokio::test]
    async fn write_after_shutdown_fails_closed() {
        let (_rx, tx) = tokio::io::duplex(1024);
        let writer = OutboundWriter::new(tx);

        writer.shutdown().await;
        let err = writer
            .write_line(&serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Closed));
    }
}
