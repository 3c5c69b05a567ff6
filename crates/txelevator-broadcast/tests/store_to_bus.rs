//! Detectors reading a real store and publishing on the local bus.

use std::sync::Arc;

use txelevator_broadcast::{
    ChainSnapshotSource, ChangeDetector, LocalBus, MessageKind, TickOutcome, TipBlockSource,
};
use txelevator_core::{
    BlockHeader, BlockRef, Network, StatusChange, StoreWriter, TransactionRecord,
    TransactionType, TxMatch,
};
use txelevator_storage::InMemoryStore;

fn record(hash: &str) -> TransactionRecord {
    TransactionRecord {
        tx_hash: hash.into(),
        tx_type: TransactionType::Ckb,
        cycles: Some(10),
        size: Some(20),
        fee: Some(30),
        version: 0,
        witnesses: vec![],
        parts: None,
    }
}

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

struct Rig {
    store: Arc<InMemoryStore>,
    bus: LocalBus,
    snapshots: ChangeDetector,
    blocks: ChangeDetector,
}

fn rig() -> Rig {
    let store = Arc::new(InMemoryStore::new());
    let bus = LocalBus::new(16);
    let shared = Arc::new(bus.clone());
    Rig {
        snapshots: ChangeDetector::new(
            Network::Testnet,
            Arc::new(ChainSnapshotSource::new(store.clone())),
            shared.clone(),
        ),
        blocks: ChangeDetector::new(
            Network::Testnet,
            Arc::new(TipBlockSource::new(store.clone())),
            shared,
        ),
        store,
        bus,
    }
}

#[tokio::test]
async fn new_pool_entry_publishes_one_snapshot() {
    let mut rig = rig();
    let mut worker = rig.bus.subscribe();

    // initial state goes out once
    rig.snapshots.tick().await.unwrap();
    worker.recv().await.unwrap();

    rig.store
        .apply(&TxMatch::Hash("0xaa".into()), StatusChange::Pending { at: 5 }, Some(&record("0xaa")))
        .await
        .unwrap();

    assert_eq!(
        rig.snapshots.tick().await.unwrap(),
        TickOutcome::Published { receivers: 1 }
    );
    let message = worker.recv().await.unwrap();
    assert_eq!(message.kind, MessageKind::NewSnapshot);
    assert_eq!(message.network, Network::Testnet);
    assert_eq!(message.payload["pendingTransactions"][0]["tx_hash"], "0xaa");

    assert_eq!(rig.snapshots.tick().await.unwrap(), TickOutcome::Unchanged);
}

#[tokio::test]
async fn block_detector_waits_for_first_header() {
    let mut rig = rig();
    let mut worker = rig.bus.subscribe();

    assert_eq!(rig.blocks.tick().await.unwrap(), TickOutcome::Empty);
    assert_eq!(rig.blocks.tick().await.unwrap(), TickOutcome::Unchanged);

    let tip = header(3);
    rig.store.save_block_header(&tip).await.unwrap();
    rig.store
        .apply(
            &TxMatch::Hash("0xcc".into()),
            StatusChange::Committed { block: BlockRef::from(&tip) },
            Some(&record("0xcc")),
        )
        .await
        .unwrap();

    assert_eq!(
        rig.blocks.tick().await.unwrap(),
        TickOutcome::Published { receivers: 1 }
    );
    let message = worker.recv().await.unwrap();
    assert_eq!(message.kind, MessageKind::NewBlock);
    assert_eq!(message.payload["blockHeader"]["block_number"], 3);
    assert_eq!(message.payload["committedTransactions"][0]["tx_hash"], "0xcc");
}

#[tokio::test]
async fn committing_into_new_tip_moves_snapshot_fingerprint() {
    let mut rig = rig();
    rig.store
        .apply(&TxMatch::Hash("0xaa".into()), StatusChange::Pending { at: 5 }, Some(&record("0xaa")))
        .await
        .unwrap();
    rig.snapshots.tick().await.unwrap();

    let tip = header(4);
    rig.store.save_block_header(&tip).await.unwrap();
    rig.store
        .apply(&TxMatch::Hash("0xaa".into()), StatusChange::Committed { block: BlockRef::from(&tip) }, None)
        .await
        .unwrap();

    assert!(matches!(
        rig.snapshots.tick().await.unwrap(),
        TickOutcome::Published { .. }
    ));
}
