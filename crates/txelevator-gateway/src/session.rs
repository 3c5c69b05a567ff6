//! Per-connection subscription state.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use txelevator_broadcast::{BusMessage, EventStream, Listener, MessageKind};

use crate::error::GatewayError;
use crate::protocol::{ClientRequest, ServerMessage};

/// An encoded outbound frame, shared by every connection it goes to.
pub type Frame = Arc<str>;

// ─── WorkerStreams ────────────────────────────────────────────────────────────

/// The two local event streams a worker re-emits bus messages on.
#[derive(Clone, Default)]
pub struct WorkerStreams {
    snapshot: EventStream<Frame>,
    block: EventStream<Frame>,
}

impl WorkerStreams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream(&self, kind: MessageKind) -> &EventStream<Frame> {
        match kind {
            MessageKind::NewSnapshot => &self.snapshot,
            MessageKind::NewBlock => &self.block,
        }
    }

    /// Encode once, deliver to every listener of the message's topic.
    pub fn publish(&self, message: &BusMessage) -> usize {
        let frame = match ServerMessage::snapshot(message.kind, &message.payload).encode() {
            Ok(frame) => Frame::from(frame),
            Err(e) => {
                warn!(kind = %message.kind, error = %e, "failed to encode snapshot frame");
                return 0;
            }
        };
        self.stream(message.kind).emit(&frame)
    }

    pub fn listener_count(&self, kind: MessageKind) -> usize {
        self.stream(kind).listener_count()
    }
}

// ─── Session ──────────────────────────────────────────────────────────────────

/// A held topic: the listener and the latest-value slot it writes into.
struct Subscription {
    _listener: Listener<Frame>,
    latest: watch::Receiver<Option<Frame>>,
}

/// Holds at most one subscription per topic. Each keeps only the newest
/// undelivered frame, so a slow client skips to the current state instead
/// of queueing. Dropping a subscription drops its slot with it, so nothing
/// published before an unsubscribe can still be delivered after it.
pub struct Session {
    id: u64,
    streams: WorkerStreams,
    snapshot: Option<Subscription>,
    block: Option<Subscription>,
}

impl Session {
    pub fn new(id: u64, streams: WorkerStreams) -> Self {
        Self {
            id,
            streams,
            snapshot: None,
            block: None,
        }
    }

    /// Apply one client text frame. Returns an error frame to send back when
    /// the request was not understood.
    pub fn handle_text(&mut self, text: &str) -> Option<String> {
        match ClientRequest::parse(text) {
            Ok(ClientRequest::Subscribe(kind)) => {
                self.subscribe(kind);
                None
            }
            Ok(ClientRequest::Unsubscribe(kind)) => {
                self.unsubscribe(kind);
                None
            }
            Err(e) => {
                debug!(conn = self.id, error = %e, "bad client request");
                error_frame(&e)
            }
        }
    }

    /// Replaces any earlier subscription for the same topic.
    pub fn subscribe(&mut self, kind: MessageKind) {
        let (tx, latest) = watch::channel(None);
        let listener = self.streams.stream(kind).listen(move |frame: &Frame| {
            // overwrites an undelivered frame; fails only once the slot is gone
            let _ = tx.send(Some(frame.clone()));
        });
        *self.slot(kind) = Some(Subscription {
            _listener: listener,
            latest,
        });
        debug!(conn = self.id, topic = %kind, "subscribed");
    }

    pub fn unsubscribe(&mut self, kind: MessageKind) -> bool {
        let removed = self.slot(kind).take().is_some();
        debug!(conn = self.id, topic = %kind, removed, "unsubscribed");
        removed
    }

    pub fn is_subscribed(&self, kind: MessageKind) -> bool {
        match kind {
            MessageKind::NewSnapshot => self.snapshot.is_some(),
            MessageKind::NewBlock => self.block.is_some(),
        }
    }

    /// Wait for the next frame on any held topic. Pending while nothing is
    /// held. Cancel safe: an unreturned frame stays in its slot.
    pub async fn next_frame(&mut self) -> Frame {
        tokio::select! {
            frame = next_in(&mut self.snapshot) => frame,
            frame = next_in(&mut self.block) => frame,
        }
    }

    fn slot(&mut self, kind: MessageKind) -> &mut Option<Subscription> {
        match kind {
            MessageKind::NewSnapshot => &mut self.snapshot,
            MessageKind::NewBlock => &mut self.block,
        }
    }
}

async fn next_in(subscription: &mut Option<Subscription>) -> Frame {
    let Some(subscription) = subscription else {
        return std::future::pending().await;
    };
    loop {
        if subscription.latest.changed().await.is_err() {
            return std::future::pending().await;
        }
        if let Some(frame) = subscription.latest.borrow_and_update().clone() {
            return frame;
        }
    }
}

pub fn error_frame(error: &GatewayError) -> Option<String> {
    ServerMessage::Error(error.to_string()).encode().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::time::Duration;
    use txelevator_core::Network;

    fn bus_message(kind: MessageKind, n: u64) -> BusMessage {
        BusMessage {
            network: Network::Testnet,
            kind,
            payload: Arc::new(json!({ "n": n })),
        }
    }

    async fn next(session: &mut Session) -> Option<Value> {
        let frame = tokio::time::timeout(Duration::from_millis(50), session.next_frame())
            .await
            .ok()?;
        Some(serde_json::from_str(&frame).unwrap())
    }

    #[tokio::test]
    async fn repeated_subscribe_keeps_one_listener() {
        let streams = WorkerStreams::new();
        let mut session = Session::new(1, streams.clone());

        for _ in 0..3 {
            assert!(session.handle_text(r#"{"type":"newSnapshot"}"#).is_none());
        }
        assert_eq!(streams.listener_count(MessageKind::NewSnapshot), 1);

        assert_eq!(streams.publish(&bus_message(MessageKind::NewSnapshot, 1)), 1);
        assert_eq!(
            next(&mut session).await,
            Some(json!({"type": "newSnapshot", "data": {"n": 1}}))
        );
        assert_eq!(next(&mut session).await, None);
    }

    #[tokio::test]
    async fn topics_are_independent() {
        let streams = WorkerStreams::new();
        let mut session = Session::new(1, streams.clone());

        session.subscribe(MessageKind::NewBlock);
        assert_eq!(streams.publish(&bus_message(MessageKind::NewSnapshot, 1)), 0);
        assert_eq!(next(&mut session).await, None);

        streams.publish(&bus_message(MessageKind::NewBlock, 2));
        assert_eq!(next(&mut session).await.unwrap()["type"], "newBlock");
    }

    #[tokio::test]
    async fn slow_reader_gets_only_the_latest_frame() {
        let streams = WorkerStreams::new();
        let mut session = Session::new(1, streams.clone());
        session.subscribe(MessageKind::NewSnapshot);
        session.subscribe(MessageKind::NewBlock);

        for n in 0..100 {
            streams.publish(&bus_message(MessageKind::NewSnapshot, n));
        }
        streams.publish(&bus_message(MessageKind::NewBlock, 7));

        let mut received = vec![
            next(&mut session).await.unwrap(),
            next(&mut session).await.unwrap(),
        ];
        received.sort_by_key(|frame| frame["type"].as_str().map(str::to_owned));
        assert_eq!(
            received,
            vec![
                json!({"type": "newBlock", "data": {"n": 7}}),
                json!({"type": "newSnapshot", "data": {"n": 99}}),
            ]
        );
        assert_eq!(next(&mut session).await, None);
    }

    #[tokio::test]
    async fn undelivered_frame_is_discarded_on_unsubscribe() {
        let streams = WorkerStreams::new();
        let mut session = Session::new(1, streams.clone());
        session.subscribe(MessageKind::NewSnapshot);

        assert_eq!(streams.publish(&bus_message(MessageKind::NewSnapshot, 7)), 1);
        session.handle_text(r#"{"type":"unsubscribe","payload":"newSnapshot"}"#);

        assert_eq!(streams.listener_count(MessageKind::NewSnapshot), 0);
        assert_eq!(next(&mut session).await, None);

        // a fresh subscription starts empty
        session.subscribe(MessageKind::NewSnapshot);
        assert_eq!(next(&mut session).await, None);
    }

    #[tokio::test]
    async fn unsubscribe_detaches_only_that_topic() {
        let streams = WorkerStreams::new();
        let mut session = Session::new(1, streams.clone());
        session.subscribe(MessageKind::NewSnapshot);
        session.subscribe(MessageKind::NewBlock);

        session.handle_text(r#"{"type":"unsubscribe","payload":"newSnapshot"}"#);
        assert_eq!(streams.listener_count(MessageKind::NewSnapshot), 0);
        assert_eq!(streams.listener_count(MessageKind::NewBlock), 1);
        assert!(!session.unsubscribe(MessageKind::NewSnapshot));

        streams.publish(&bus_message(MessageKind::NewBlock, 3));
        assert_eq!(next(&mut session).await.unwrap()["data"]["n"], 3);
    }

    #[test]
    fn dropping_session_restores_baseline() {
        let streams = WorkerStreams::new();
        let mut other = Session::new(1, streams.clone());
        other.subscribe(MessageKind::NewBlock);
        let baseline = streams.listener_count(MessageKind::NewBlock);

        let mut session = Session::new(2, streams.clone());
        session.subscribe(MessageKind::NewSnapshot);
        session.subscribe(MessageKind::NewBlock);
        drop(session);

        assert_eq!(streams.listener_count(MessageKind::NewSnapshot), 0);
        assert_eq!(streams.listener_count(MessageKind::NewBlock), baseline);
    }

    #[test]
    fn malformed_request_answers_with_error_and_keeps_state() {
        let streams = WorkerStreams::new();
        let mut session = Session::new(1, streams);
        session.subscribe(MessageKind::NewBlock);

        let reply = session.handle_text("{{{").unwrap();
        let reply: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(reply["type"], "error");
        assert!(reply["data"].as_str().unwrap().starts_with("malformed request"));
        assert!(session.is_subscribed(MessageKind::NewBlock));
    }
}
