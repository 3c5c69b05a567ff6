//! Startup reconciliation against the node's pool.
//!
//! Rows left `Pending`/`Proposing`/`Proposed` by a previous run may no
//! longer be in the pool. Before subscribing, each local non-terminal row is
//! checked against the node:
//!
//! - still in the pool's proposed set → advance a `Pending` row to `Proposing`
//! - still in the pool → leave it
//! - committed on chain → `Committed` at that block
//! - anything else → `Rejected` with reason `Orphaned: <node status>`

use std::collections::HashSet;

use tracing::{debug, info, warn};

use txelevator_core::{
    now_millis, BlockRef, ElevatorError, StatusChange, StoreWriter, TransactionStatus, TxMatch,
};
use txelevator_rpc::{NodeClient, RpcTransport};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub checked: usize,
    pub advanced: usize,
    pub committed: usize,
    pub orphaned: usize,
}

pub async fn reconcile<T: RpcTransport>(
    node: &NodeClient<T>,
    store: &dyn StoreWriter,
) -> Result<ReconcileReport, ElevatorError> {
    let pool = node.get_raw_tx_pool().await?;
    let pending: HashSet<String> = pool.pending.iter().map(|h| h.to_ascii_lowercase()).collect();
    let proposed: HashSet<String> = pool.proposed.iter().map(|h| h.to_ascii_lowercase()).collect();

    let local = store.non_terminal_transactions().await?;
    let mut report = ReconcileReport {
        checked: local.len(),
        ..Default::default()
    };

    for tx in local {
        let hash = tx.tx_hash.to_ascii_lowercase();
        let target = TxMatch::Hash(hash.clone());

        if proposed.contains(&hash) {
            if tx.status == TransactionStatus::Pending {
                let outcome = store
                    .apply(&target, StatusChange::Proposing { at: now_millis() }, None)
                    .await?;
                if outcome.changed() {
                    report.advanced += 1;
                }
            }
            continue;
        }
        if pending.contains(&hash) {
            continue;
        }

        let status = node.get_transaction(&hash).await?;
        let node_status = status
            .as_ref()
            .map(|s| s.tx_status.status.as_str())
            .unwrap_or("unknown");

        match (node_status, status.as_ref().and_then(|s| s.tx_status.block_hash.as_deref())) {
            ("committed", Some(block_hash)) => match node.get_header(block_hash).await? {
                Some(header) => {
                    let block = BlockRef {
                        hash: header.hash,
                        number: header.number,
                        timestamp: header.timestamp as i64,
                    };
                    if store
                        .apply(&target, StatusChange::Committed { block }, None)
                        .await?
                        .changed()
                    {
                        report.committed += 1;
                    }
                }
                None => warn!(tx_hash = %hash, block_hash, "committed block header not found"),
            },
            // entered the pool after the snapshot above
            ("pending" | "proposed", _) => {
                debug!(tx_hash = %hash, node_status, "pool changed during reconciliation");
            }
            (other, _) => {
                let change = StatusChange::Rejected {
                    reason: format!("Orphaned: {other}"),
                    at: now_millis(),
                };
                if store.apply(&target, change, None).await?.changed() {
                    report.orphaned += 1;
                }
            }
        }
    }

    info!(
        url = node.url(),
        checked = report.checked,
        advanced = report.advanced,
        committed = report.committed,
        orphaned = report.orphaned,
        "reconciled local pool state"
    );
    Ok(report)
}
