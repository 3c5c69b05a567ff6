//! Accept loop distributing connections round-robin over workers.

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{info, warn};

use txelevator_broadcast::LocalBus;
use txelevator_core::Network;

use crate::worker::Worker;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub network: Network,
    pub workers: usize,
}

pub struct Gateway {
    config: GatewayConfig,
    feeds: Vec<mpsc::UnboundedSender<TcpStream>>,
}

impl Gateway {
    /// Spawn the workers. Each gets its own bus receiver, so this must run
    /// before the detectors publish anything the workers should see.
    pub fn spawn(config: GatewayConfig, bus: &LocalBus) -> Self {
        let count = config.workers.max(1);
        let feeds = (0..count)
            .map(|id| {
                let (tx, rx) = mpsc::unbounded_channel();
                let worker = Worker::new(id, config.network);
                tokio::spawn(worker.run(bus.subscribe(), rx));
                tx
            })
            .collect();
        Self { config, feeds }
    }

    pub fn worker_count(&self) -> usize {
        self.feeds.len()
    }

    /// Accept forever. A failed accept is logged and skipped.
    pub async fn serve(self, listener: TcpListener) {
        info!(
            addr = ?listener.local_addr().ok(),
            workers = self.feeds.len(),
            network = %self.config.network,
            "gateway listening"
        );
        let mut next = 0usize;
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            };
            let worker = next % self.feeds.len();
            next = next.wrapping_add(1);
            if self.feeds[worker].send(stream).is_err() {
                warn!(worker, peer = %peer, "worker gone, dropping connection");
            }
        }
    }
}
