//! Control-plane correlation for caller-initiated requests.
//!
//! Each outbound control request gets a unique `<prefix>-<counter>`
//! identifier and a single-shot reply slot. The reader resolves the slot
//! when the matching `control_response` arrives; the deadline and session
//! close paths fail it. An identifier is removed atomically with its
//! resolution, so a late response can never resolve an already-failed slot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::AgentError;
use crate::transport::OutboundWriter;
use crate::wire::control::{ControlOutcome, InboundControlResponse, OutboundControlRequest};

type ReplySlot = oneshot::Sender<Result<Value, AgentError>>;

/// Correlates caller-initiated control requests with inbound responses.
pub struct ControlCorrelator {
    prefix: String,
    counter: AtomicU64,
    pending: Mutex<HashMap<String, ReplySlot>>,
}

impl Default for ControlCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlCorrelator {
    /// Create a correlator with a fresh session prefix.
    #[must_use]
    pub fn new() -> Self {
        let prefix = Uuid::new_v4().simple().to_string()[..8].to_string();
        Self {
            prefix,
            counter: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn next_request_id(&self) -> String {
        format!(
            "{}-{}",
            self.prefix,
            self.counter.fetch_add(1, Ordering::Relaxed)
        )
    }

    /// Number of requests still awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("correlator lock poisoned").len()
    }

    /// Send `request` and await its response up to `timeout`.
    ///
    /// # Errors
    ///
    /// - [`AgentError::ControlError`] when the process answers with an
    ///   error payload.
    /// - [`AgentError::ControlTimeout`] when the deadline elapses; the
    ///   pending entry is removed so a late response cannot resolve it.
    /// - [`AgentError::ClosedWhilePending`] when the session closes first.
    /// - The write error when the request cannot be sent at all.
    pub async fn request(
        &self,
        writer: &OutboundWriter,
        request: OutboundControlRequest,
        timeout: Duration,
    ) -> Result<Value, AgentError> {
        let request_id = self.next_request_id();
        let subtype = request.subtype().to_string();
        let (tx, rx) = oneshot::channel();

        self.pending
            .lock()
            .expect("correlator lock poisoned")
            .insert(request_id.clone(), tx);

        tracing::debug!(request_id = %request_id, subtype = %subtype, "sending control request");

        if let Err(e) = writer.write_line(&request.to_envelope(&request_id)).await {
            self.remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            // The slot sender was dropped without resolution: the session
            // tore down the pending map.
            Ok(Err(_)) => Err(AgentError::ClosedWhilePending),
            Err(_) => {
                self.remove(&request_id);
                tracing::warn!(request_id = %request_id, subtype = %subtype, "control request timed out");
                Err(AgentError::ControlTimeout { subtype })
            }
        }
    }

    /// Resolve a pending request from an inbound `control_response`.
    ///
    /// Responses for unknown identifiers (late, duplicate, or foreign) are
    /// logged and dropped.
    pub fn resolve(&self, response: InboundControlResponse) {
        let slot = self
            .pending
            .lock()
            .expect("correlator lock poisoned")
            .remove(&response.request_id);

        let Some(slot) = slot else {
            tracing::warn!(
                request_id = %response.request_id,
                "control response for unknown request id"
            );
            return;
        };

        let outcome = match response.outcome {
            ControlOutcome::Success(payload) => Ok(payload),
            ControlOutcome::Error(message) => Err(AgentError::ControlError(message)),
        };
        // The receiver may have timed out between removal and send; that
        // race is benign because the entry is already gone.
        let _ = slot.send(outcome);
    }

    /// Fail every pending request. Used on session close and transport
    /// termination.
    pub fn fail_all(&self, error: impl Fn() -> AgentError) {
        let drained: Vec<(String, ReplySlot)> = {
            let mut pending = self.pending.lock().expect("correlator lock poisoned");
            pending.drain().collect()
        };

        for (request_id, slot) in drained {
            tracing::debug!(request_id = %request_id, "failing pending control request");
            let _ = slot.send(Err(error()));
        }
    }

    fn remove(&self, request_id: &str) {
        self.pending
            .lock()
            .expect("correlator lock poisoned")
            .remove(request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success_for(request_id: &str, payload: Value) -> InboundControlResponse {
        InboundControlResponse {
            request_id: request_id.to_string(),
            outcome: ControlOutcome::Success(payload),
        }
    }

    fn error_for(request_id: &str, message: &str) -> InboundControlResponse {
        InboundControlResponse {
            request_id: request_id.to_string(),
            outcome: ControlOutcome::Error(message.to_string()),
        }
    }

    fn writer_pair() -> (OutboundWriter, tokio::io::DuplexStream) {
        let (rx, tx) = tokio::io::duplex(64 * 1024);
        (OutboundWriter::new(tx), rx)
    }

    #[tokio::test]
    async fn request_resolves_on_success_response() {
        let (writer, _rx) = writer_pair();
        let correlator = std::sync::Arc::new(ControlCorrelator::new());

        let pending = correlator.clone();
        let resolver = tokio::spawn(async move {
            // Wait until the request is registered, then resolve it.
            loop {
                if pending.pending_count() == 1 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            let request_id = {
                let map = pending.pending.lock().unwrap();
                map.keys().next().unwrap().clone()
            };
            pending.resolve(success_for(&request_id, serde_json::json!({"status": "ok"})));
        });

        let result = correlator
            .request(
                &writer,
                OutboundControlRequest::Interrupt,
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert_eq!(result["status"], "ok");
        resolver.await.unwrap();
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn request_fails_on_error_response() {
        let (writer, _rx) = writer_pair();
        let correlator = std::sync::Arc::new(ControlCorrelator::new());

        let pending = correlator.clone();
        tokio::spawn(async move {
            loop {
                if pending.pending_count() == 1 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            let request_id = {
                let map = pending.pending.lock().unwrap();
                map.keys().next().unwrap().clone()
            };
            pending.resolve(error_for(&request_id, "model not available"));
        });

        let err = correlator
            .request(
                &writer,
                OutboundControlRequest::SetModel {
                    model: "bogus".to_string(),
                },
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ControlError(_)));
        assert!(err.to_string().contains("model not available"));
    }

    #[tokio::test]
    async fn request_times_out_and_removes_entry() {
        let (writer, _rx) = writer_pair();
        let correlator = ControlCorrelator::new();

        let err = correlator
            .request(
                &writer,
                OutboundControlRequest::SetModel {
                    model: "m".to_string(),
                },
                Duration::from_millis(100),
            )
            .await
            .unwrap_err();

        match err {
            AgentError::ControlTimeout { subtype } => assert_eq!(subtype, "set_model"),
            other => panic!("expected timeout, got {other}"),
        }
        // No late resolution possible: the entry is gone.
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn late_response_after_timeout_is_dropped() {
        let (writer, _rx) = writer_pair();
        let correlator = ControlCorrelator::new();

        let _ = correlator
            .request(
                &writer,
                OutboundControlRequest::Interrupt,
                Duration::from_millis(50),
            )
            .await;

        // A response arriving after the timeout must be a no-op.
        correlator.resolve(success_for("nonexistent-0", Value::Null));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn fail_all_resolves_everything_pending() {
        let (writer, _rx) = writer_pair();
        let correlator = std::sync::Arc::new(ControlCorrelator::new());

        let mut handles = Vec::new();
        for _ in 0..3 {
            let correlator = correlator.clone();
            let writer = writer.clone();
            handles.push(tokio::spawn(async move {
                correlator
                    .request(
                        &writer,
                        OutboundControlRequest::Interrupt,
                        Duration::from_secs(5),
                    )
                    .await
            }));
        }

        loop {
            if correlator.pending_count() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        correlator.fail_all(|| AgentError::ClosedWhilePending);

        for handle in handles {
            let result = handle.await.unwrap();
            assert!(matches!(result, Err(AgentError::ClosedWhilePending)));
        }
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn request_ids_are_unique_and_prefixed() {
        let correlator = ControlCorrelator::new();
        let a = correlator.next_request_id();
        let b = correlator.next_request_id();
        assert_ne!(a, b);
        let prefix_a = a.split('-').next().unwrap();
        let prefix_b = b.split('-').next().unwrap();
        assert_eq!(prefix_a, prefix_b);
        assert_eq!(prefix_a.len(), 8);
    }
}
