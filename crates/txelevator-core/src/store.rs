//! The storage contract.
//!
//! Readers and the writer are separate traits: every serving worker gets a
//! `StoreReader`, and exactly one primary holds the `StoreWriter`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ElevatorError;
use crate::model::{BlockHeader, BlockRef, Transaction, TransactionDetail, TransactionRecord};
use crate::snapshot::{
    average_block_interval, BlockSnapshot, ChainSnapshot, ChainStats, ChangeFingerprint,
    TxFingerprint,
};
use crate::status::TransactionStatus;

/// Number of recent headers sampled for the average block interval.
pub const STATS_HEADER_SAMPLE: usize = 100;

// ─── Write vocabulary ────────────────────────────────────────────────────────

/// How the writer locates the row a change applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxMatch {
    /// Full transaction hash.
    Hash(String),
    /// Proposal short id, matched as a hash prefix among non-terminal rows.
    ShortId(String),
}

impl TxMatch {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Hash(h) | Self::ShortId(h) => h,
        }
    }
}

/// A status transition together with the data it stamps on the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    Pending { at: i64 },
    Proposing { at: i64 },
    Proposed { block: BlockRef },
    Committed { block: BlockRef },
    Rejected { reason: String, at: i64 },
}

impl StatusChange {
    pub fn status(&self) -> TransactionStatus {
        match self {
            Self::Pending { .. } => TransactionStatus::Pending,
            Self::Proposing { .. } => TransactionStatus::Proposing,
            Self::Proposed { .. } => TransactionStatus::Proposed,
            Self::Committed { .. } => TransactionStatus::Committed,
            Self::Rejected { .. } => TransactionStatus::Rejected,
        }
    }
}

/// Why a write left the store untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No row matched and no record was supplied to create one.
    NotFound,
    /// The row exists but may not move to the requested status.
    Illegal {
        from: TransactionStatus,
        to: TransactionStatus,
    },
    /// A short id matched more than one non-terminal row.
    Ambiguous { matches: usize },
    /// The row is already in the requested status.
    Duplicate,
}

/// Result of a single [`StoreWriter::apply`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    Transitioned {
        from: TransactionStatus,
        to: TransactionStatus,
    },
    Ignored(IgnoreReason),
}

impl WriteOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, Self::Ignored(_))
    }
}

/// Decide whether a row in `current` may take `next`.
///
/// Shared by every backend so they agree on the state machine.
pub fn check_transition(
    current: TransactionStatus,
    next: TransactionStatus,
) -> Result<(), IgnoreReason> {
    if current == next {
        Err(IgnoreReason::Duplicate)
    } else if current.can_transition_to(next) {
        Ok(())
    } else {
        Err(IgnoreReason::Illegal {
            from: current,
            to: next,
        })
    }
}

/// Ordering for block header pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            other => Err(format!("invalid order: {other}")),
        }
    }
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Read access to transactions and block headers.
#[async_trait]
pub trait StoreReader: Send + Sync {
    /// All rows currently in `status`, oldest first.
    async fn transactions_by_status(
        &self,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, ElevatorError>;

    async fn committed_transactions_by_block(
        &self,
        block_hash: &str,
    ) -> Result<Vec<Transaction>, ElevatorError>;

    async fn proposed_transactions_by_block(
        &self,
        block_hash: &str,
    ) -> Result<Vec<Transaction>, ElevatorError>;

    async fn transaction_by_hash(&self, tx_hash: &str)
        -> Result<Option<Transaction>, ElevatorError>;

    /// Every row whose hash starts with `prefix`, in any status.
    async fn transactions_by_prefix(&self, prefix: &str)
        -> Result<Vec<Transaction>, ElevatorError>;

    /// The row plus its reconstructed inputs, outputs and dependencies.
    async fn transaction_detail(
        &self,
        tx_hash: &str,
    ) -> Result<Option<TransactionDetail>, ElevatorError>;

    /// Pending, Proposing and Proposed rows.
    async fn non_terminal_transactions(&self) -> Result<Vec<Transaction>, ElevatorError>;

    async fn block_header_by_hash(
        &self,
        block_hash: &str,
    ) -> Result<Option<BlockHeader>, ElevatorError>;

    /// The header with the highest block number.
    async fn tip_block_header(&self) -> Result<Option<BlockHeader>, ElevatorError>;

    async fn tip_block_number(&self) -> Result<Option<u64>, ElevatorError>;

    async fn block_headers(
        &self,
        order: SortOrder,
        limit: usize,
    ) -> Result<Vec<BlockHeader>, ElevatorError>;

    /// The most recently written row, newest `last_modified_at` first with
    /// ties broken by insertion order. Rows in `exclude` are skipped.
    async fn last_modified_fingerprint(
        &self,
        exclude: Option<TransactionStatus>,
    ) -> Result<Option<TxFingerprint>, ElevatorError>;

    async fn count_by_status(&self, status: TransactionStatus) -> Result<u64, ElevatorError>;

    // ── Provided ─────────────────────────────────────────────────────────────

    async fn change_fingerprint(
        &self,
        exclude: Option<TransactionStatus>,
    ) -> Result<ChangeFingerprint, ElevatorError> {
        Ok(ChangeFingerprint {
            tip_block_number: self.tip_block_number().await?,
            last_modified: self.last_modified_fingerprint(exclude).await?,
        })
    }

    async fn chain_snapshot(&self) -> Result<ChainSnapshot, ElevatorError> {
        let tip = self.tip_block_header().await?;
        let tip_committed_transactions = match &tip {
            Some(header) => {
                self.committed_transactions_by_block(&header.block_hash)
                    .await?
            }
            None => Vec::new(),
        };
        Ok(ChainSnapshot {
            tip_block_number: tip.map(|h| h.block_number),
            tip_committed_transactions,
            pending_transactions: self
                .transactions_by_status(TransactionStatus::Pending)
                .await?,
            proposing_transactions: self
                .transactions_by_status(TransactionStatus::Proposing)
                .await?,
            proposed_transactions: self
                .transactions_by_status(TransactionStatus::Proposed)
                .await?,
        })
    }

    /// `None` until the first block header is stored.
    async fn block_snapshot(&self) -> Result<Option<BlockSnapshot>, ElevatorError> {
        let Some(block_header) = self.tip_block_header().await? else {
            return Ok(None);
        };
        let committed_transactions = self
            .committed_transactions_by_block(&block_header.block_hash)
            .await?;
        let proposed_transactions = self
            .proposed_transactions_by_block(&block_header.block_hash)
            .await?;
        Ok(Some(BlockSnapshot {
            block_header,
            committed_transactions,
            proposed_transactions,
        }))
    }

    async fn stats(&self) -> Result<ChainStats, ElevatorError> {
        let mut stats = ChainStats::default();
        for status in TransactionStatus::ALL {
            stats.set_count(status, self.count_by_status(status).await?);
        }
        stats.tip_block_number = self.tip_block_number().await?;
        let recent = self
            .block_headers(SortOrder::Desc, STATS_HEADER_SAMPLE)
            .await?;
        stats.average_block_time = average_block_interval(&recent);
        Ok(stats)
    }
}

/// Mutating access. Held only by the primary.
#[async_trait]
pub trait StoreWriter: StoreReader {
    /// Upsert: transition the matched row, or insert `record` in the status
    /// `change` carries when nothing matches.
    ///
    /// A fresh row is written atomically with `record.parts`, if any.
    async fn apply(
        &self,
        target: &TxMatch,
        change: StatusChange,
        record: Option<&TransactionRecord>,
    ) -> Result<WriteOutcome, ElevatorError>;

    /// Store a header. Returns `false` if a header with that hash exists.
    async fn save_block_header(&self, header: &BlockHeader) -> Result<bool, ElevatorError>;
}
