//! Self-restarting poll loop around a [`ChangeDetector`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::detector::{ChangeDetector, TickOutcome};

// ─── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub poll_interval: Duration,
    pub liveness_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            liveness_interval: Duration::from_secs(5),
        }
    }
}

// ─── RunningGuard ─────────────────────────────────────────────────────────────

/// Clears the running flag when the loop exits, including by panic.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ─── SupervisedDetector ───────────────────────────────────────────────────────

pub struct SupervisedDetector {
    name: &'static str,
    detector: Arc<Mutex<ChangeDetector>>,
    running: Arc<AtomicBool>,
    restarts: Arc<AtomicU64>,
    config: SupervisorConfig,
}

impl SupervisedDetector {
    pub fn new(detector: ChangeDetector, config: SupervisorConfig) -> Self {
        Self {
            name: detector.name(),
            detector: Arc::new(Mutex::new(detector)),
            running: Arc::new(AtomicBool::new(false)),
            restarts: Arc::new(AtomicU64::new(0)),
            config,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::SeqCst)
    }

    /// Spawn the poll loop. The flag is raised before the task exists so a
    /// liveness check cannot observe a half-started loop as dead.
    fn start(&self) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        tokio::spawn(poll_loop(
            self.name,
            self.detector.clone(),
            self.running.clone(),
            self.config.poll_interval,
        ))
    }

    /// Run forever: start the loop, then restart it whenever the liveness
    /// check finds the running flag cleared.
    pub async fn run(self) {
        info!(
            detector = self.name,
            poll_ms = self.config.poll_interval.as_millis() as u64,
            "starting change detector"
        );
        let mut handle = self.start();

        let mut liveness = tokio::time::interval(self.config.liveness_interval);
        liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);
        liveness.tick().await;

        loop {
            liveness.tick().await;
            if self.is_running() {
                continue;
            }
            let restarts = self.restarts.fetch_add(1, Ordering::SeqCst) + 1;
            error!(detector = self.name, restarts, "poll loop stopped, restarting");
            handle.abort();
            handle = self.start();
        }
    }
}

async fn poll_loop(
    name: &'static str,
    detector: Arc<Mutex<ChangeDetector>>,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    let _guard = RunningGuard(running.clone());
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while running.load(Ordering::SeqCst) {
        ticker.tick().await;
        let outcome = detector.lock().await.tick().await;
        match outcome {
            Ok(TickOutcome::Published { receivers }) => {
                debug!(detector = name, receivers, "change broadcast");
            }
            Ok(TickOutcome::Unchanged | TickOutcome::Empty) => {}
            Err(e) => {
                error!(detector = name, error = %e, "poll iteration failed");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusMessage, MessageBus, MessageKind};
    use crate::source::ChangeSource;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicUsize;
    use txelevator_core::{ChangeFingerprint, ElevatorError, Network};

    /// Fails on the first fingerprint read, panics on the second, then
    /// reports a new tip on every read after that.
    struct FlakySource {
        reads: AtomicUsize,
    }

    #[async_trait]
    impl ChangeSource for FlakySource {
        fn kind(&self) -> MessageKind {
            MessageKind::NewSnapshot
        }

        async fn fingerprint(&self) -> Result<ChangeFingerprint, ElevatorError> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            match n {
                0 => Err(ElevatorError::Storage("locked".into())),
                1 => panic!("poll iteration blew up"),
                _ => Ok(ChangeFingerprint {
                    tip_block_number: Some(n as u64),
                    last_modified: None,
                }),
            }
        }

        async fn snapshot(&self) -> Result<Option<Value>, ElevatorError> {
            Ok(Some(json!({})))
        }
    }

    #[derive(Default)]
    struct CountingBus {
        published: AtomicUsize,
    }

    impl MessageBus for CountingBus {
        fn publish(&self, _message: BusMessage) -> Result<usize, ElevatorError> {
            self.published.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dead_loop_is_restarted_after_error_and_panic() {
        let bus = Arc::new(CountingBus::default());
        let source = Arc::new(FlakySource {
            reads: AtomicUsize::new(0),
        });
        let detector = ChangeDetector::new(Network::Testnet, source, bus.clone());
        let supervised = SupervisedDetector::new(
            detector,
            SupervisorConfig {
                poll_interval: Duration::from_millis(100),
                liveness_interval: Duration::from_millis(500),
            },
        );
        let running = supervised.running.clone();
        let restarts = supervised.restarts.clone();
        let task = tokio::spawn(supervised.run());

        tokio::time::sleep(Duration::from_millis(2_000)).await;

        assert_eq!(restarts.load(Ordering::SeqCst), 2);
        assert!(running.load(Ordering::SeqCst));
        assert!(bus.published.load(Ordering::SeqCst) > 0);
        task.abort();
    }

    #[test]
    fn guard_clears_flag_on_drop() {
        let flag = Arc::new(AtomicBool::new(true));
        drop(RunningGuard(flag.clone()));
        assert!(!flag.load(Ordering::SeqCst));
    }
}
