//! Per-topic event handlers. Each one turns a node payload into store
//! writes; the store enforces the transition rules.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use txelevator_core::{
    now_millis, ElevatorError, IgnoreReason, ScriptRegistry, StatusChange, StoreWriter, TxMatch,
    WriteOutcome,
};
use txelevator_rpc::{BlockView, NotificationParams, PoolTransactionEntry, RejectedTransaction};

use crate::convert::{
    block_ref, header_from_view, record_from_block_transaction, record_from_pool_entry,
};
use crate::topic::Topic;

/// What a `new_tip_block` event changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockSummary {
    pub number: u64,
    pub header_stored: bool,
    pub proposed: usize,
    pub committed: usize,
    pub inserted: usize,
}

/// Applies feed events to the writer store.
pub struct EventHandler {
    store: Arc<dyn StoreWriter>,
    registry: ScriptRegistry,
}

impl EventHandler {
    pub fn new(store: Arc<dyn StoreWriter>, registry: ScriptRegistry) -> Self {
        Self { store, registry }
    }

    /// Decode a pushed payload for `topic` and apply it.
    pub async fn dispatch(
        &self,
        topic: Topic,
        params: &NotificationParams,
    ) -> Result<(), ElevatorError> {
        match topic {
            Topic::NewTipBlock => {
                self.on_new_tip_block(&params.decode()?).await?;
            }
            Topic::NewTransaction => {
                self.on_new_transaction(&params.decode()?).await?;
            }
            Topic::ProposedTransaction => {
                self.on_proposed_transaction(&params.decode()?).await?;
            }
            Topic::RejectedTransaction => {
                self.on_rejected_transaction(&params.decode()?).await?;
            }
        }
        Ok(())
    }

    /// Pool entry: a new `Pending` row stamped with the pool entry time.
    pub async fn on_new_transaction(
        &self,
        entry: &PoolTransactionEntry,
    ) -> Result<WriteOutcome, ElevatorError> {
        let record = record_from_pool_entry(entry, &self.registry);
        let change = StatusChange::Pending {
            at: entry.timestamp as i64,
        };
        let outcome = self
            .store
            .apply(&TxMatch::Hash(record.tx_hash.clone()), change, Some(&record))
            .await?;
        log_outcome(Topic::NewTransaction, &record.tx_hash, &outcome);
        Ok(outcome)
    }

    /// Pool moved the transaction into proposing.
    pub async fn on_proposed_transaction(
        &self,
        entry: &PoolTransactionEntry,
    ) -> Result<WriteOutcome, ElevatorError> {
        let record = record_from_pool_entry(entry, &self.registry);
        let change = StatusChange::Proposing { at: now_millis() };
        let outcome = self
            .store
            .apply(&TxMatch::Hash(record.tx_hash.clone()), change, Some(&record))
            .await?;
        log_outcome(Topic::ProposedTransaction, &record.tx_hash, &outcome);
        Ok(outcome)
    }

    /// Pool dropped the transaction. Terminal.
    pub async fn on_rejected_transaction(
        &self,
        (entry, reject): &RejectedTransaction,
    ) -> Result<WriteOutcome, ElevatorError> {
        let record = record_from_pool_entry(entry, &self.registry);
        let change = StatusChange::Rejected {
            reason: reject.to_string(),
            at: now_millis(),
        };
        let outcome = self
            .store
            .apply(&TxMatch::Hash(record.tx_hash.clone()), change, Some(&record))
            .await?;
        log_outcome(Topic::RejectedTransaction, &record.tx_hash, &outcome);
        Ok(outcome)
    }

    /// Store the header, then mark proposals `Proposed` and body
    /// transactions `Committed` at this block.
    pub async fn on_new_tip_block(&self, block: &BlockView) -> Result<BlockSummary, ElevatorError> {
        let header = header_from_view(&block.header);
        let at = block_ref(&block.header);
        let mut summary = BlockSummary {
            number: header.block_number,
            header_stored: self.store.save_block_header(&header).await?,
            ..Default::default()
        };

        for short_id in &block.proposals {
            let outcome = self
                .store
                .apply(
                    &TxMatch::ShortId(short_id.clone()),
                    StatusChange::Proposed { block: at.clone() },
                    None,
                )
                .await?;
            if outcome.changed() {
                summary.proposed += 1;
            }
            log_outcome(Topic::NewTipBlock, short_id, &outcome);
        }

        for tx in &block.transactions {
            let record = record_from_block_transaction(tx, &self.registry);
            let outcome = self
                .store
                .apply(
                    &TxMatch::Hash(tx.hash.clone()),
                    StatusChange::Committed { block: at.clone() },
                    Some(&record),
                )
                .await?;
            match outcome {
                WriteOutcome::Inserted => summary.inserted += 1,
                WriteOutcome::Transitioned { .. } => summary.committed += 1,
                WriteOutcome::Ignored(_) => {}
            }
            log_outcome(Topic::NewTipBlock, &tx.hash, &outcome);
        }

        debug!(
            number = summary.number,
            proposals = block.proposals.len(),
            transactions = block.transactions.len(),
            proposed = summary.proposed,
            committed = summary.committed,
            inserted = summary.inserted,
            "new tip block"
        );
        Ok(summary)
    }
}

fn log_outcome(topic: Topic, id: &str, outcome: &WriteOutcome) {
    match outcome {
        WriteOutcome::Inserted | WriteOutcome::Transitioned { .. } => {
            trace!(%topic, id, ?outcome, "applied");
        }
        WriteOutcome::Ignored(IgnoreReason::Duplicate) => {
            trace!(%topic, id, "already in requested status");
        }
        WriteOutcome::Ignored(IgnoreReason::NotFound) => {
            debug!(%topic, id, "no tracked transaction matches, ignored");
        }
        WriteOutcome::Ignored(IgnoreReason::Illegal { from, to }) => {
            debug!(%topic, id, %from, %to, "refused backward or terminal transition");
        }
        WriteOutcome::Ignored(IgnoreReason::Ambiguous { matches }) => {
            warn!(%topic, id, matches, "proposal short id matches several transactions, skipped");
        }
    }
}
