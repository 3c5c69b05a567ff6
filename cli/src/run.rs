//! `txelevator run`: the primary pipeline plus gateway workers and the API.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use txelevator_broadcast::{
    ChainSnapshotSource, ChangeDetector, LocalBus, MessageBus, SupervisedDetector,
    SupervisorConfig, TipBlockSource,
};
use txelevator_core::{Network, ScriptRegistry, StoreReader};
use txelevator_gateway::{Gateway, GatewayConfig};
use txelevator_rpc::{HttpRpcClient, NodeClient};
use txelevator_storage::SqliteStore;
use txelevator_subscriber::{reconcile, EventHandler, Subscriber, SubscriberConfig};

use crate::config::RunArgs;

pub async fn run(args: RunArgs) -> Result<()> {
    let node = args.node.resolve();
    info!(
        network = %node.network,
        ws = %node.ws_url,
        http = %node.http_url,
        database = %node.database_file,
        "starting txelevator"
    );

    // the only writer handle
    let writer = Arc::new(
        SqliteStore::open(&node.database_file)
            .await
            .with_context(|| format!("opening database {}", node.database_file))?,
    );

    if !args.no_reconcile {
        let client = HttpRpcClient::default_for(node.http_url.as_str())
            .with_context(|| format!("invalid node http url {}", node.http_url))?;
        match reconcile(&NodeClient::new(client), writer.as_ref()).await {
            Ok(report) => info!(
                checked = report.checked,
                advanced = report.advanced,
                committed = report.committed,
                orphaned = report.orphaned,
                "startup reconciliation done"
            ),
            Err(e) => warn!(error = %e, "startup reconciliation failed, continuing with local state"),
        }
    }

    // workers subscribe to the bus before any detector publishes
    let bus = LocalBus::new(args.bus_capacity);
    let gateway = Gateway::spawn(
        GatewayConfig {
            network: node.network,
            workers: args.worker_count(),
        },
        &bus,
    );
    let ws_listener = TcpListener::bind((args.bind.as_str(), args.ws_port))
        .await
        .with_context(|| format!("binding websocket port {}", args.ws_port))?;

    let reader: Arc<dyn StoreReader> = Arc::new(
        SqliteStore::open_read_only(&node.database_file)
            .await
            .context("opening read-only database handle")?,
    );
    let http_listener = TcpListener::bind((args.bind.as_str(), args.http_port))
        .await
        .with_context(|| format!("binding http port {}", args.http_port))?;

    let supervisor = SupervisorConfig {
        poll_interval: args.poll_interval(),
        liveness_interval: args.liveness_interval(),
    };
    let (snapshots, blocks) =
        change_detectors(node.network, reader.clone(), Arc::new(bus.clone()));
    let snapshots = SupervisedDetector::new(snapshots, supervisor.clone());
    let blocks = SupervisedDetector::new(blocks, supervisor);

    let handler = EventHandler::new(writer.clone(), ScriptRegistry::for_network(node.network));
    let subscriber = Subscriber::new(
        SubscriberConfig {
            ws_url: node.ws_url.clone(),
            retry_delay: args.reconnect_delay(),
        },
        handler,
    );

    tokio::select! {
        result = subscriber.run() => {
            result.context("node feed subscriber stopped")?;
        }
        _ = gateway.serve(ws_listener) => {}
        result = txelevator_api::serve(http_listener, reader) => {
            result.context("http api stopped")?;
        }
        _ = snapshots.run() => {}
        _ = blocks.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, shutting down");
        }
    }
    Ok(())
}

/// Snapshot and block detectors. They only ever get a read handle, so
/// polling never takes a connection from the writer.
fn change_detectors(
    network: Network,
    reader: Arc<dyn StoreReader>,
    publisher: Arc<dyn MessageBus>,
) -> (ChangeDetector, ChangeDetector) {
    let snapshots = ChangeDetector::new(
        network,
        Arc::new(ChainSnapshotSource::new(reader.clone())),
        publisher.clone(),
    );
    let blocks = ChangeDetector::new(network, Arc::new(TipBlockSource::new(reader)), publisher);
    (snapshots, blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use txelevator_broadcast::{MessageKind, TickOutcome};
    use txelevator_core::{BlockHeader, StoreWriter};

    fn header(number: u64) -> BlockHeader {
        BlockHeader {
            block_hash: format!("0xb{number:02}"),
            block_number: number,
            parent_hash: format!("0xb{:02}", number.saturating_sub(1)),
            proposals_hash: "0x00".into(),
            transactions_root: "0x00".into(),
            compact_target: 1,
            nonce: "0x0".into(),
            timestamp: 1_000 * number,
            version: 0,
            epoch: 1,
            dao: "0x00".into(),
            extra_hash: "0x00".into(),
        }
    }

    #[tokio::test]
    async fn detectors_publish_writer_commits_through_read_only_handle() {
        let dir = std::env::temp_dir().join(format!("txelevator-run-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("detectors.db").to_string_lossy().into_owned();

        let writer = SqliteStore::open(&path).await.unwrap();
        let reader: Arc<dyn StoreReader> =
            Arc::new(SqliteStore::open_read_only(&path).await.unwrap());
        let bus = LocalBus::new(8);
        let mut worker = bus.subscribe();
        let (mut snapshots, mut blocks) =
            change_detectors(Network::Testnet, reader, Arc::new(bus.clone()));

        assert!(matches!(blocks.tick().await.unwrap(), TickOutcome::Empty));

        writer.save_block_header(&header(5)).await.unwrap();
        assert!(matches!(
            blocks.tick().await.unwrap(),
            TickOutcome::Published { receivers: 1 }
        ));
        let message = worker.recv().await.unwrap();
        assert_eq!(message.kind, MessageKind::NewBlock);
        assert!(message.payload.to_string().contains("0xb05"));

        assert!(matches!(
            snapshots.tick().await.unwrap(),
            TickOutcome::Published { .. }
        ));
        assert_eq!(worker.recv().await.unwrap().kind, MessageKind::NewSnapshot);

        drop(writer);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
