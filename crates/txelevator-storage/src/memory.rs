//! In-memory storage backend.
//!
//! Keeps transaction rows and block headers in RAM. Useful for tests and
//! short-lived runs that don't need persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use txelevator_core::store::check_transition;
use txelevator_core::{
    now_millis, BlockHeader, ElevatorError, IgnoreReason, SortOrder, StatusChange, StoreReader,
    StoreWriter, Transaction, TransactionDetail, TransactionParts, TransactionRecord,
    TransactionStatus, TxFingerprint, TxMatch, WriteOutcome,
};

struct Row {
    tx: Transaction,
    parts: Option<TransactionParts>,
}

#[derive(Default)]
struct State {
    /// Insertion order doubles as the row id.
    rows: Vec<Row>,
    by_hash: HashMap<String, usize>,
    headers: Vec<BlockHeader>,
    header_index: HashMap<String, usize>,
}

impl State {
    fn resolve(&self, target: &TxMatch) -> Result<Option<usize>, IgnoreReason> {
        match target {
            TxMatch::Hash(hash) => Ok(self.by_hash.get(&hash.to_ascii_lowercase()).copied()),
            TxMatch::ShortId(prefix) => {
                let prefix = prefix.to_ascii_lowercase();
                let matches: Vec<usize> = self
                    .rows
                    .iter()
                    .enumerate()
                    .filter(|(_, r)| !r.tx.status.is_terminal() && r.tx.tx_hash.starts_with(&prefix))
                    .map(|(i, _)| i)
                    .collect();
                match matches.as_slice() {
                    [] => Ok(None),
                    [only] => Ok(Some(*only)),
                    many => Err(IgnoreReason::Ambiguous {
                        matches: many.len(),
                    }),
                }
            }
        }
    }

    fn select<F>(&self, filter: F) -> Vec<Transaction>
    where
        F: Fn(&Transaction) -> bool,
    {
        self.rows
            .iter()
            .filter(|r| filter(&r.tx))
            .map(|r| r.tx.clone())
            .collect()
    }

    fn tip(&self) -> Option<&BlockHeader> {
        self.headers.iter().max_by_key(|h| h.block_number)
    }
}

/// In-memory transaction and block header store.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored transaction rows.
    pub fn transaction_count(&self) -> usize {
        self.state.lock().rows.len()
    }
}

#[async_trait]
impl StoreReader for InMemoryStore {
    async fn transactions_by_status(
        &self,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, ElevatorError> {
        Ok(self.state.lock().select(|tx| tx.status == status))
    }

    async fn committed_transactions_by_block(
        &self,
        block_hash: &str,
    ) -> Result<Vec<Transaction>, ElevatorError> {
        Ok(self.state.lock().select(|tx| {
            tx.status == TransactionStatus::Committed
                && tx.committed_at_block_hash.as_deref() == Some(block_hash)
        }))
    }

    async fn proposed_transactions_by_block(
        &self,
        block_hash: &str,
    ) -> Result<Vec<Transaction>, ElevatorError> {
        Ok(self
            .state
            .lock()
            .select(|tx| tx.proposed_at_block_hash.as_deref() == Some(block_hash)))
    }

    async fn transaction_by_hash(
        &self,
        tx_hash: &str,
    ) -> Result<Option<Transaction>, ElevatorError> {
        let state = self.state.lock();
        Ok(state
            .by_hash
            .get(&tx_hash.to_ascii_lowercase())
            .map(|&i| state.rows[i].tx.clone()))
    }

    async fn transactions_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<Transaction>, ElevatorError> {
        let prefix = prefix.to_ascii_lowercase();
        Ok(self.state.lock().select(|tx| tx.tx_hash.starts_with(&prefix)))
    }

    async fn transaction_detail(
        &self,
        tx_hash: &str,
    ) -> Result<Option<TransactionDetail>, ElevatorError> {
        let state = self.state.lock();
        let Some(&i) = state.by_hash.get(&tx_hash.to_ascii_lowercase()) else {
            return Ok(None);
        };
        let row = &state.rows[i];
        let parts = row.parts.clone().unwrap_or_default();
        Ok(Some(TransactionDetail {
            transaction: row.tx.clone(),
            inputs: parts.inputs,
            outputs: parts.outputs,
            cell_deps: parts.cell_deps,
            header_deps: parts.header_deps,
        }))
    }

    async fn non_terminal_transactions(&self) -> Result<Vec<Transaction>, ElevatorError> {
        Ok(self.state.lock().select(|tx| !tx.status.is_terminal()))
    }

    async fn block_header_by_hash(
        &self,
        block_hash: &str,
    ) -> Result<Option<BlockHeader>, ElevatorError> {
        let state = self.state.lock();
        Ok(state
            .header_index
            .get(block_hash)
            .map(|&i| state.headers[i].clone()))
    }

    async fn tip_block_header(&self) -> Result<Option<BlockHeader>, ElevatorError> {
        Ok(self.state.lock().tip().cloned())
    }

    async fn tip_block_number(&self) -> Result<Option<u64>, ElevatorError> {
        Ok(self.state.lock().tip().map(|h| h.block_number))
    }

    async fn block_headers(
        &self,
        order: SortOrder,
        limit: usize,
    ) -> Result<Vec<BlockHeader>, ElevatorError> {
        let mut headers = self.state.lock().headers.clone();
        headers.sort_by_key(|h| h.block_number);
        if order == SortOrder::Desc {
            headers.reverse();
        }
        headers.truncate(limit);
        Ok(headers)
    }

    async fn last_modified_fingerprint(
        &self,
        exclude: Option<TransactionStatus>,
    ) -> Result<Option<TxFingerprint>, ElevatorError> {
        let state = self.state.lock();
        Ok(state
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| Some(r.tx.status) != exclude)
            .max_by_key(|(i, r)| (r.tx.last_modified_at, *i))
            .map(|(_, r)| TxFingerprint {
                tx_hash: r.tx.tx_hash.clone(),
                status: r.tx.status,
                last_modified_at: r.tx.last_modified_at,
            }))
    }

    async fn count_by_status(&self, status: TransactionStatus) -> Result<u64, ElevatorError> {
        Ok(self
            .state
            .lock()
            .rows
            .iter()
            .filter(|r| r.tx.status == status)
            .count() as u64)
    }
}

#[async_trait]
impl StoreWriter for InMemoryStore {
    async fn apply(
        &self,
        target: &TxMatch,
        change: StatusChange,
        record: Option<&TransactionRecord>,
    ) -> Result<WriteOutcome, ElevatorError> {
        let now = now_millis();
        let mut state = self.state.lock();

        let found = match state.resolve(target) {
            Ok(found) => found,
            Err(reason) => return Ok(WriteOutcome::Ignored(reason)),
        };

        if let Some(i) = found {
            let row = &mut state.rows[i];
            let from = row.tx.status;
            let to = change.status();
            if let Err(reason) = check_transition(from, to) {
                return Ok(WriteOutcome::Ignored(reason));
            }
            row.tx.apply(&change, now);
            debug!(tx_hash = %row.tx.tx_hash, %from, %to, "transaction transitioned");
            return Ok(WriteOutcome::Transitioned { from, to });
        }

        let Some(record) = record else {
            return Ok(WriteOutcome::Ignored(IgnoreReason::NotFound));
        };
        let mut tx = Transaction::from_record(record, &change, now);
        tx.tx_hash = tx.tx_hash.to_ascii_lowercase();
        let index = state.rows.len();
        state.by_hash.insert(tx.tx_hash.clone(), index);
        debug!(tx_hash = %tx.tx_hash, status = %tx.status, "transaction inserted");
        state.rows.push(Row {
            tx,
            parts: record.parts.clone(),
        });
        Ok(WriteOutcome::Inserted)
    }

    async fn save_block_header(&self, header: &BlockHeader) -> Result<bool, ElevatorError> {
        let mut state = self.state.lock();
        if state.header_index.contains_key(&header.block_hash) {
            return Ok(false);
        }
        let index = state.headers.len();
        state.header_index.insert(header.block_hash.clone(), index);
        state.headers.push(header.clone());
        debug!(number = header.block_number, hash = %header.block_hash, "block header stored");
        Ok(true)
    }
}
