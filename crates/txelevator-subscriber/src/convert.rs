//! Node payloads → store records.

use txelevator_core::{
    classify, BlockHeader, BlockRef, CellDep, CellInput, CellOutput, ScriptRegistry,
    TransactionParts, TransactionRecord,
};
use txelevator_rpc::{HeaderView, PoolTransactionEntry, TransactionView};

pub fn parts_from_view(view: &TransactionView) -> TransactionParts {
    TransactionParts {
        inputs: view
            .inputs
            .iter()
            .map(|i| CellInput {
                previous_tx_hash: i.previous_output.tx_hash.clone(),
                previous_index: i.previous_output.index,
                since: i.since,
            })
            .collect(),
        outputs: view
            .outputs
            .iter()
            .enumerate()
            .map(|(i, o)| CellOutput {
                capacity: o.capacity,
                lock: o.lock.clone(),
                type_script: o.type_script.clone(),
                data: view
                    .outputs_data
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| "0x".to_string()),
            })
            .collect(),
        cell_deps: view
            .cell_deps
            .iter()
            .map(|d| CellDep {
                tx_hash: d.out_point.tx_hash.clone(),
                index: d.out_point.index,
                dep_type: d.dep_type,
            })
            .collect(),
        header_deps: view.header_deps.clone(),
    }
}

/// Full record for a transaction seen in the pool.
pub fn record_from_pool_entry(
    entry: &PoolTransactionEntry,
    registry: &ScriptRegistry,
) -> TransactionRecord {
    let parts = parts_from_view(&entry.transaction);
    TransactionRecord {
        tx_hash: entry.transaction.hash.clone(),
        tx_type: classify(registry, &parts),
        cycles: Some(entry.cycles),
        size: Some(entry.size),
        fee: Some(entry.fee),
        version: entry.transaction.version,
        witnesses: entry.transaction.witnesses.clone(),
        parts: Some(parts),
    }
}

/// Record for a transaction first seen inside a block body.
///
/// Classified from its shape, stored without sub-records.
pub fn record_from_block_transaction(
    view: &TransactionView,
    registry: &ScriptRegistry,
) -> TransactionRecord {
    let parts = parts_from_view(view);
    TransactionRecord {
        tx_hash: view.hash.clone(),
        tx_type: classify(registry, &parts),
        cycles: None,
        size: None,
        fee: None,
        version: view.version,
        witnesses: view.witnesses.clone(),
        parts: None,
    }
}

pub fn header_from_view(view: &HeaderView) -> BlockHeader {
    BlockHeader {
        block_hash: view.hash.clone(),
        block_number: view.number,
        parent_hash: view.parent_hash.clone(),
        proposals_hash: view.proposals_hash.clone(),
        transactions_root: view.transactions_root.clone(),
        compact_target: view.compact_target,
        nonce: view.nonce.clone(),
        timestamp: view.timestamp,
        version: view.version,
        epoch: view.epoch,
        dao: view.dao.clone(),
        extra_hash: view.extra_hash.clone(),
    }
}

pub fn block_ref(view: &HeaderView) -> BlockRef {
    BlockRef {
        hash: view.hash.clone(),
        number: view.number,
        timestamp: view.timestamp as i64,
    }
}
