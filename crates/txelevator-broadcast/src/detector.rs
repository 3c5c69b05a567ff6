//! One poll iteration: compare fingerprints, publish on change.

use std::sync::Arc;

use tracing::debug;

use txelevator_core::{ChangeFingerprint, ElevatorError, Network};

use crate::bus::{BusMessage, MessageBus};
use crate::source::ChangeSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Fingerprint matched the previous tick; nothing was read or sent.
    Unchanged,
    /// Fingerprint moved but the source had nothing to publish.
    Empty,
    /// A fresh snapshot went out to `receivers` workers.
    Published { receivers: usize },
}

pub struct ChangeDetector {
    network: Network,
    source: Arc<dyn ChangeSource>,
    bus: Arc<dyn MessageBus>,
    last: Option<ChangeFingerprint>,
}

impl ChangeDetector {
    pub fn new(network: Network, source: Arc<dyn ChangeSource>, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            network,
            source,
            bus,
            last: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.source.kind().as_str()
    }

    /// The fingerprint is only remembered once its snapshot went out, so a
    /// failed read is retried on the next tick.
    pub async fn tick(&mut self) -> Result<TickOutcome, ElevatorError> {
        let fingerprint = self.source.fingerprint().await?;
        if self.last.as_ref() == Some(&fingerprint) {
            return Ok(TickOutcome::Unchanged);
        }

        let outcome = match self.source.snapshot().await? {
            Some(payload) => {
                let receivers = self.bus.publish(BusMessage {
                    network: self.network,
                    kind: self.source.kind(),
                    payload: Arc::new(payload),
                })?;
                debug!(
                    kind = %self.source.kind(),
                    network = %self.network,
                    tip = ?fingerprint.tip_block_number,
                    receivers,
                    "published snapshot"
                );
                TickOutcome::Published { receivers }
            }
            None => TickOutcome::Empty,
        };
        self.last = Some(fingerprint);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageKind;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fingerprint is whatever the test sets; counts snapshot reads.
    struct FakeSource {
        tip: Mutex<Option<u64>>,
        snapshot_reads: AtomicUsize,
        fail_snapshot: Mutex<bool>,
    }

    impl FakeSource {
        fn new(tip: u64) -> Self {
            Self {
                tip: Mutex::new(Some(tip)),
                snapshot_reads: AtomicUsize::new(0),
                fail_snapshot: Mutex::new(false),
            }
        }
    }

    #[async_trait]
    impl ChangeSource for FakeSource {
        fn kind(&self) -> MessageKind {
            MessageKind::NewBlock
        }

        async fn fingerprint(&self) -> Result<ChangeFingerprint, ElevatorError> {
            Ok(ChangeFingerprint {
                tip_block_number: *self.tip.lock(),
                last_modified: None,
            })
        }

        async fn snapshot(&self) -> Result<Option<Value>, ElevatorError> {
            self.snapshot_reads.fetch_add(1, Ordering::SeqCst);
            if *self.fail_snapshot.lock() {
                return Err(ElevatorError::Storage("disk gone".into()));
            }
            Ok(Some(json!({ "tip": *self.tip.lock() })))
        }
    }

    #[derive(Default)]
    struct RecordingBus {
        sent: Mutex<Vec<BusMessage>>,
    }

    impl MessageBus for RecordingBus {
        fn publish(&self, message: BusMessage) -> Result<usize, ElevatorError> {
            self.sent.lock().push(message);
            Ok(1)
        }
    }

    fn detector(source: &Arc<FakeSource>, bus: &Arc<RecordingBus>) -> ChangeDetector {
        ChangeDetector::new(Network::Testnet, source.clone(), bus.clone())
    }

    #[tokio::test]
    async fn unchanged_fingerprint_reads_and_sends_nothing() {
        let source = Arc::new(FakeSource::new(5));
        let bus = Arc::new(RecordingBus::default());
        let mut detector = detector(&source, &bus);

        assert_eq!(detector.tick().await.unwrap(), TickOutcome::Published { receivers: 1 });
        assert_eq!(source.snapshot_reads.load(Ordering::SeqCst), 1);

        for _ in 0..2 {
            assert_eq!(detector.tick().await.unwrap(), TickOutcome::Unchanged);
        }
        assert_eq!(source.snapshot_reads.load(Ordering::SeqCst), 1);
        assert_eq!(bus.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn changed_fingerprint_publishes_full_snapshot() {
        let source = Arc::new(FakeSource::new(5));
        let bus = Arc::new(RecordingBus::default());
        let mut detector = detector(&source, &bus);

        detector.tick().await.unwrap();
        *source.tip.lock() = Some(6);
        detector.tick().await.unwrap();

        let sent = bus.sent.lock();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].payload["tip"], 6);
        assert_eq!(sent[1].kind, MessageKind::NewBlock);
        assert_eq!(sent[1].network, Network::Testnet);
    }

    #[tokio::test]
    async fn failed_snapshot_is_retried_next_tick() {
        let source = Arc::new(FakeSource::new(5));
        let bus = Arc::new(RecordingBus::default());
        let mut detector = detector(&source, &bus);

        *source.fail_snapshot.lock() = true;
        assert!(detector.tick().await.is_err());

        *source.fail_snapshot.lock() = false;
        assert_eq!(detector.tick().await.unwrap(), TickOutcome::Published { receivers: 1 });
    }
}
