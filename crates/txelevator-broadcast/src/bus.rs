//! One-directional primary → worker message bus.
//!
//! Fire-and-forget: no acknowledgement, no retry. A worker that falls
//! behind the channel capacity skips to the newest messages, which is
//! fine because every message carries a full snapshot.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::warn;

use txelevator_core::{ElevatorError, Network};

/// Which snapshot a message carries. Also the downstream topic name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageKind {
    NewSnapshot,
    NewBlock,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewSnapshot => "newSnapshot",
            Self::NewBlock => "newBlock",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "newSnapshot" => Some(Self::NewSnapshot),
            "newBlock" => Some(Self::NewBlock),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A full snapshot tagged with its network and kind.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub network: Network,
    pub kind: MessageKind,
    /// Shared between all receivers.
    pub payload: Arc<Value>,
}

/// Publishing side of the bus, as seen by detectors.
pub trait MessageBus: Send + Sync {
    /// Returns how many receivers the message was queued for.
    fn publish(&self, message: BusMessage) -> Result<usize, ElevatorError>;
}

/// In-process bus backed by a `tokio::sync::broadcast` channel.
#[derive(Clone)]
pub struct LocalBus {
    tx: broadcast::Sender<BusMessage>,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// A receiver for one worker. Sees only messages published after this call.
    pub fn subscribe(&self) -> BusReceiver {
        BusReceiver {
            rx: self.tx.subscribe(),
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl MessageBus for LocalBus {
    fn publish(&self, message: BusMessage) -> Result<usize, ElevatorError> {
        // no receivers yet is not a failure: nobody is listening
        Ok(self.tx.send(message).unwrap_or(0))
    }
}

/// Worker side of a [`LocalBus`].
pub struct BusReceiver {
    rx: broadcast::Receiver<BusMessage>,
}

impl BusReceiver {
    /// Next message, skipping over any backlog this receiver lost.
    /// `None` once the bus is dropped.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        loop {
            match self.rx.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "bus receiver lagged, skipping to newest messages");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(n: u64) -> BusMessage {
        BusMessage {
            network: Network::Testnet,
            kind: MessageKind::NewBlock,
            payload: Arc::new(json!({ "n": n })),
        }
    }

    #[tokio::test]
    async fn every_worker_receives_each_message() {
        let bus = LocalBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        assert_eq!(bus.publish(message(1)).unwrap(), 2);
        assert_eq!(a.recv().await.unwrap().payload["n"], 1);
        assert_eq!(b.recv().await.unwrap().payload["n"], 1);
    }

    #[tokio::test]
    async fn publish_without_receivers_is_fine() {
        let bus = LocalBus::new(8);
        assert_eq!(bus.publish(message(1)).unwrap(), 0);
    }

    #[tokio::test]
    async fn lagging_receiver_skips_to_recent() {
        let bus = LocalBus::new(2);
        let mut slow = bus.subscribe();
        for n in 0..5 {
            bus.publish(message(n)).unwrap();
        }
        // only the last `capacity` messages survive
        assert_eq!(slow.recv().await.unwrap().payload["n"], 3);
        assert_eq!(slow.recv().await.unwrap().payload["n"], 4);
    }

    #[tokio::test]
    async fn closed_bus_ends_receiver() {
        let bus = LocalBus::new(2);
        let mut rx = bus.subscribe();
        drop(bus);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn kind_wire_names() {
        assert_eq!(serde_json::to_string(&MessageKind::NewSnapshot).unwrap(), "\"newSnapshot\"");
        assert_eq!(MessageKind::NewBlock.to_string(), "newBlock");
    }
}
