//! Per-turn stream demultiplexing.
//!
//! One single-slot reference holds the active turn subscriber. A shared
//! broadcast sink cancelled by a take-until-result operator corrupts across
//! turns; a per-turn unicast channel completed directly on observing the
//! `result` message does not, so that is what lives here.
//!
//! Installing a new subscriber atomically completes and replaces any prior
//! one. Buffers are unbounded: inbound from the process is authoritative
//! and must never be dropped, and delivery must never block the reader.

use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::error::AgentError;
use crate::wire::message::AgentMessage;

/// Item delivered to subscribers: a message, or the error that ended the
/// stream.
pub type TurnItem = Result<AgentMessage, AgentError>;

type Slot = Mutex<Option<mpsc::UnboundedSender<TurnItem>>>;

/// Routes data-plane messages to the active turn subscriber and the
/// session-lifetime subscriber.
#[derive(Default)]
pub struct TurnDemux {
    /// Active turn subscriber; completed and cleared on `result`.
    turn: Slot,
    /// Session-lifetime subscriber fed every data-plane message.
    all: Slot,
}

impl TurnDemux {
    /// Create an empty demultiplexer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a fresh turn subscriber, completing any prior one normally.
    ///
    /// The returned receiver yields this turn's messages and closes after
    /// the turn's `result` has been delivered.
    pub fn subscribe_turn(&self) -> mpsc::UnboundedReceiver<TurnItem> {
        let (tx, rx) = mpsc::unbounded_channel();
        let previous = self
            .turn
            .lock()
            .expect("turn slot lock poisoned")
            .replace(tx);
        if previous.is_some() {
            tracing::debug!("superseding previous turn subscriber");
        }
        // Dropping the previous sender closes its channel: the superseded
        // subscriber completes normally, without a result.
        drop(previous);
        rx
    }

    /// Install the session-lifetime subscriber, replacing any prior one.
    /// It receives every data-plane message until close or termination.
    pub fn subscribe_all(&self) -> mpsc::UnboundedReceiver<TurnItem> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.all.lock().expect("all slot lock poisoned").replace(tx);
        rx
    }

    /// Deliver one data-plane message.
    ///
    /// The turn subscriber, if any, receives the message; a `result`
    /// completes it and clears the slot atomically with the delivery.
    pub fn dispatch(&self, message: AgentMessage) {
        let is_result = message.is_result();

        {
            let all = self.all.lock().expect("all slot lock poisoned");
            if let Some(tx) = all.as_ref() {
                let _ = tx.send(Ok(message.clone()));
            }
        }

        let mut turn = self.turn.lock().expect("turn slot lock poisoned");
        if let Some(tx) = turn.as_ref() {
            let _ = tx.send(Ok(message));
            if is_result {
                turn.take();
            }
        } else if !is_result {
            tracing::debug!("no active turn subscriber, message buffered only for session tap");
        }
    }

    /// Fail the active subscribers with `error`. Used when the process dies
    /// mid-turn.
    pub fn fail(&self, error: impl Fn() -> AgentError) {
        if let Some(tx) = self.turn.lock().expect("turn slot lock poisoned").take() {
            let _ = tx.send(Err(error()));
        }
        if let Some(tx) = self.all.lock().expect("all slot lock poisoned").take() {
            let _ = tx.send(Err(error()));
        }
    }

    /// Complete all subscribers normally. Used on orderly close.
    pub fn complete(&self) {
        self.turn.lock().expect("turn slot lock poisoned").take();
        self.all.lock().expect("all slot lock poisoned").take();
    }

    /// Returns true when a turn subscriber is installed.
    #[must_use]
    pub fn has_turn_subscriber(&self) -> bool {
        self.turn.lock().expect("turn slot lock poisoned").is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::message::ResultMessage;

    fn assistant(text: &str) -> AgentMessage {
        serde_json::from_value(serde_json::json!({
            "type": "assistant",
            "message": {"role": "assistant", "content": [{"type": "text", "text": text}]}
        }))
        .unwrap()
    }

    fn result() -> AgentMessage {
        AgentMessage::Result(ResultMessage::default())
    }

    #[tokio::test]
    async fn turn_completes_on_result() {
        let demux = TurnDemux::new();
        let mut rx = demux.subscribe_turn();

        demux.dispatch(assistant("hello"));
        demux.dispatch(result());

        assert_eq!(rx.recv().await.unwrap().unwrap().text(), "hello");
        assert!(rx.recv().await.unwrap().unwrap().is_result());
        // Channel closed: the turn is over.
        assert!(rx.recv().await.is_none());
        assert!(!demux.has_turn_subscriber());
    }

    #[tokio::test]
    async fn result_is_always_the_last_element() {
        let demux = TurnDemux::new();
        let mut rx = demux.subscribe_turn();

        demux.dispatch(assistant("a"));
        demux.dispatch(result());
        // Messages after the result belong to nobody until a new subscriber
        // arrives.
        demux.dispatch(assistant("late"));

        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item.unwrap());
        }
        assert_eq!(items.len(), 2);
        assert!(items.last().unwrap().is_result());
    }

    #[tokio::test]
    async fn new_subscriber_supersedes_previous_normally() {
        let demux = TurnDemux::new();
        let mut first = demux.subscribe_turn();
        demux.dispatch(assistant("for-first"));

        let mut second = demux.subscribe_turn();
        demux.dispatch(assistant("for-second"));
        demux.dispatch(result());

        // First saw its message, then completed without error and without a
        // result.
        assert_eq!(first.recv().await.unwrap().unwrap().text(), "for-first");
        assert!(first.recv().await.is_none());

        assert_eq!(second.recv().await.unwrap().unwrap().text(), "for-second");
        assert!(second.recv().await.unwrap().unwrap().is_result());
        assert!(second.recv().await.is_none());
    }

    #[tokio::test]
    async fn second_turn_sees_nothing_from_first_turn() {
        let demux = TurnDemux::new();
        let mut first = demux.subscribe_turn();
        demux.dispatch(assistant("turn1"));
        demux.dispatch(result());

        let mut second = demux.subscribe_turn();
        demux.dispatch(assistant("turn2"));
        demux.dispatch(result());

        let mut seen = Vec::new();
        while let Some(item) = second.recv().await {
            seen.push(item.unwrap());
        }
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].text(), "turn2");

        // Drain first for completeness.
        let mut first_seen = Vec::new();
        while let Some(item) = first.recv().await {
            first_seen.push(item.unwrap());
        }
        assert_eq!(first_seen.len(), 2);
    }

    #[tokio::test]
    async fn fail_delivers_error_and_clears() {
        let demux = TurnDemux::new();
        let mut rx = demux.subscribe_turn();

        demux.dispatch(assistant("streaming"));
        demux.fail(|| AgentError::TransportTerminated { exit_code: Some(1) });

        assert!(rx.recv().await.unwrap().is_ok());
        let err = rx.recv().await.unwrap().unwrap_err();
        assert!(matches!(err, AgentError::TransportTerminated { .. }));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn session_tap_spans_turns() {
        let demux = TurnDemux::new();
        let mut all = demux.subscribe_all();

        let _turn1 = demux.subscribe_turn();
        demux.dispatch(assistant("t1"));
        demux.dispatch(result());
        let _turn2 = demux.subscribe_turn();
        demux.dispatch(assistant("t2"));
        demux.dispatch(result());
        demux.complete();

        let mut count = 0;
        while let Some(item) = all.recv().await {
            item.unwrap();
            count += 1;
        }
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn messages_without_subscriber_are_not_errors() {
        let demux = TurnDemux::new();
        // No subscriber installed; dispatch must not panic or block.
        demux.dispatch(assistant("nobody listening"));
        demux.dispatch(result());
    }

    #[tokio::test]
    async fn delivery_order_is_preserved() {
        let demux = TurnDemux::new();
        let mut rx = demux.subscribe_turn();

        for i in 0..100 {
            demux.dispatch(assistant(&format!("msg-{i}")));
        }
        demux.dispatch(result());

        for i in 0..100 {
            let msg = rx.recv().await.unwrap().unwrap();
            assert_eq!(msg.text(), format!("msg-{i}"));
        }
        assert!(rx.recv().await.unwrap().unwrap().is_result());
    }
}
