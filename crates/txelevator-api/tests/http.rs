//! Query routes served over a real socket.

use std::sync::Arc;

use serde_json::Value;

use txelevator_core::{
    BlockHeader, BlockRef, StatusChange, StoreWriter, TransactionRecord, TransactionType, TxMatch,
};
use txelevator_storage::InMemoryStore;

fn record(hash: &str) -> TransactionRecord {
    TransactionRecord {
        tx_hash: hash.into(),
        tx_type: TransactionType::Udt,
        cycles: Some(1),
        size: Some(2),
        fee: Some(3),
        version: 0,
        witnesses: vec![],
        parts: None,
    }
}

fn header(number: u64) -> BlockHeader {
    BlockHeader {
        block_hash: format!("0xb{number}"),
        block_number: number,
        parent_hash: format!("0xb{}", number.saturating_sub(1)),
        proposals_hash: "0x00".into(),
        transactions_root: "0x00".into(),
        compact_target: 1,
        nonce: "0x0".into(),
        timestamp: 8_000 * number,
        version: 0,
        epoch: 1,
        dao: "0x00".into(),
        extra_hash: "0x00".into(),
    }
}

async fn seeded() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    for n in 1..=3 {
        store.save_block_header(&header(n)).await.unwrap();
    }
    store
        .apply(&TxMatch::Hash("0xaa".into()), StatusChange::Pending { at: 10 }, Some(&record("0xaa")))
        .await
        .unwrap();
    store
        .apply(
            &TxMatch::Hash("0xcc".into()),
            StatusChange::Committed { block: BlockRef::from(&header(3)) },
            Some(&record("0xcc")),
        )
        .await
        .unwrap();
    store
}

async fn spawn_api(store: Arc<InMemoryStore>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(txelevator_api::serve(listener, store));
    format!("http://{addr}")
}

async fn get(base: &str, path: &str) -> (u16, Value) {
    let response = reqwest::get(format!("{base}{path}")).await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn status_listings_and_lookups() {
    let base = spawn_api(seeded().await).await;

    let (status, body) = get(&base, "/pending-txs").await;
    assert_eq!(status, 200);
    assert_eq!(body[0]["tx_hash"], "0xaa");
    assert_eq!(body[0]["type"], "UDT");

    let (_, body) = get(&base, "/rejected-txs").await;
    assert_eq!(body, Value::Array(vec![]));

    let (_, body) = get(&base, "/committed-txs?blockHash=0xb3").await;
    assert_eq!(body[0]["tx_hash"], "0xcc");

    let (status, body) = get(&base, "/tx?txHash=0xaa").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "Pending");
}

#[tokio::test]
async fn block_routes() {
    let base = spawn_api(seeded().await).await;

    let (_, tip) = get(&base, "/tip-block-header").await;
    assert_eq!(tip["block_number"], 3);

    let (_, snapshot) = get(&base, "/tip-block-txs").await;
    assert_eq!(snapshot["committedTransactions"][0]["tx_hash"], "0xcc");

    let (_, page) = get(&base, "/all-block-headers?order=ASC&limit=2").await;
    let numbers: Vec<u64> = page
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["block_number"].as_u64().unwrap())
        .collect();
    assert_eq!(numbers, vec![1, 2]);

    let (_, stats) = get(&base, "/chain-stats").await;
    assert_eq!(stats["pendingCount"], 1);
    assert_eq!(stats["committedCount"], 1);
    assert_eq!(stats["tipBlockNumber"], 3);
    assert_eq!(stats["averageBlockTime"], 8.0);
}

#[tokio::test]
async fn errors_are_json() {
    let base = spawn_api(Arc::new(InMemoryStore::new())).await;

    let (status, body) = get(&base, "/committed-txs").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "blockHash is required");

    let (status, body) = get(&base, "/tx?txHash=0xdead").await;
    assert_eq!(status, 404);
    assert!(body["error"].as_str().unwrap().contains("0xdead"));

    let (status, _) = get(&base, "/tip-block-header").await;
    assert_eq!(status, 404);

    let (status, _) = get(&base, "/all-block-headers?order=up").await;
    assert_eq!(status, 400);
}
