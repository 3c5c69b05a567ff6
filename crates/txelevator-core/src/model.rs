//! Persisted rows and the normalized parts of a transaction.

use serde::{Deserialize, Serialize};

use crate::status::TransactionStatus;
use crate::store::StatusChange;

// ─── Network ─────────────────────────────────────────────────────────────────

/// The chain a pipeline instance follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mainnet => write!(f, "mainnet"),
            Self::Testnet => write!(f, "testnet"),
        }
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            other => Err(format!("unknown network: {other}")),
        }
    }
}

// ─── TransactionType ─────────────────────────────────────────────────────────

/// Coarse classification of what a transaction does, derived from its outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Other,
    #[serde(rename = "CKB")]
    Ckb,
    #[serde(rename = "UDT")]
    Udt,
    #[serde(rename = "DOB")]
    Dob,
    #[serde(rename = "DAO")]
    Dao,
    #[serde(rename = "RGB++")]
    Rgbpp,
    Cellbase,
}

impl TransactionType {
    pub fn code(self) -> i64 {
        match self {
            Self::Other => 0,
            Self::Ckb => 1,
            Self::Udt => 2,
            Self::Dob => 3,
            Self::Dao => 4,
            Self::Rgbpp => 5,
            Self::Cellbase => 6,
        }
    }

    /// Unknown codes decode as [`TransactionType::Other`].
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Ckb,
            2 => Self::Udt,
            3 => Self::Dob,
            4 => Self::Dao,
            5 => Self::Rgbpp,
            6 => Self::Cellbase,
            _ => Self::Other,
        }
    }
}

// ─── Scripts and cells ───────────────────────────────────────────────────────

/// How a script's `code_hash` is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashType {
    Data,
    Type,
    Data1,
    Data2,
}

impl HashType {
    pub fn code(self) -> i64 {
        match self {
            Self::Data => 0,
            Self::Type => 1,
            Self::Data1 => 2,
            Self::Data2 => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Data),
            1 => Some(Self::Type),
            2 => Some(Self::Data1),
            4 => Some(Self::Data2),
            _ => None,
        }
    }
}

/// Cell dependency kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepType {
    Code,
    DepGroup,
}

impl DepType {
    pub fn code(self) -> i64 {
        match self {
            Self::Code => 0,
            Self::DepGroup => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Code),
            1 => Some(Self::DepGroup),
            _ => None,
        }
    }
}

/// A lock or type script. Stored once per distinct content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Script {
    pub code_hash: String,
    pub hash_type: HashType,
    pub args: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellInput {
    pub previous_tx_hash: String,
    pub previous_index: u32,
    pub since: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellOutput {
    /// Capacity in shannons.
    pub capacity: u64,
    pub lock: Script,
    #[serde(rename = "type")]
    pub type_script: Option<Script>,
    /// Hex-encoded output data.
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellDep {
    pub tx_hash: String,
    pub index: u32,
    pub dep_type: DepType,
}

/// The normalized sub-records of a transaction, written atomically with it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionParts {
    pub inputs: Vec<CellInput>,
    pub outputs: Vec<CellOutput>,
    pub cell_deps: Vec<CellDep>,
    pub header_deps: Vec<String>,
}

// ─── TransactionRecord ───────────────────────────────────────────────────────

/// Everything known about a transaction at first sighting.
///
/// Used by the store to create a row when an upsert finds no match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub tx_hash: String,
    pub tx_type: TransactionType,
    pub cycles: Option<u64>,
    pub size: Option<u64>,
    pub fee: Option<u64>,
    pub version: u32,
    pub witnesses: Vec<String>,
    /// `None` for rows created from a block body (no sub-records stored).
    pub parts: Option<TransactionParts>,
}

// ─── Transaction ─────────────────────────────────────────────────────────────

/// A tracked transaction row. All timestamps are Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub tx_hash: String,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    pub cycles: Option<u64>,
    pub size: Option<u64>,
    pub fee: Option<u64>,
    pub version: u32,
    pub witnesses: Vec<String>,
    pub enter_pool_at: Option<i64>,
    pub proposing_at: Option<i64>,
    pub proposed_at: Option<i64>,
    pub proposed_at_block_hash: Option<String>,
    pub proposed_at_block_number: Option<u64>,
    pub committed_at: Option<i64>,
    pub committed_at_block_hash: Option<String>,
    pub committed_at_block_number: Option<u64>,
    pub rejected_at: Option<i64>,
    pub rejected_reason: Option<String>,
    pub last_modified_at: i64,
}

impl Transaction {
    /// Build a fresh row from a record, already in the status `change` carries.
    pub fn from_record(record: &TransactionRecord, change: &StatusChange, now: i64) -> Self {
        let mut tx = Self {
            tx_hash: record.tx_hash.clone(),
            tx_type: record.tx_type,
            status: change.status(),
            cycles: record.cycles,
            size: record.size,
            fee: record.fee,
            version: record.version,
            witnesses: record.witnesses.clone(),
            enter_pool_at: None,
            proposing_at: None,
            proposed_at: None,
            proposed_at_block_hash: None,
            proposed_at_block_number: None,
            committed_at: None,
            committed_at_block_hash: None,
            committed_at_block_number: None,
            rejected_at: None,
            rejected_reason: None,
            last_modified_at: now,
        };
        tx.stamp(change);
        tx
    }

    /// Move this row to the status carried by `change`.
    ///
    /// Callers check [`TransactionStatus::can_transition_to`] first.
    pub fn apply(&mut self, change: &StatusChange, now: i64) {
        self.status = change.status();
        self.stamp(change);
        self.last_modified_at = now;
    }

    fn stamp(&mut self, change: &StatusChange) {
        match change {
            StatusChange::Pending { at } => self.enter_pool_at = Some(*at),
            StatusChange::Proposing { at } => self.proposing_at = Some(*at),
            StatusChange::Proposed { block } => {
                self.proposed_at = Some(block.timestamp);
                self.proposed_at_block_hash = Some(block.hash.clone());
                self.proposed_at_block_number = Some(block.number);
            }
            StatusChange::Committed { block } => {
                self.committed_at = Some(block.timestamp);
                self.committed_at_block_hash = Some(block.hash.clone());
                self.committed_at_block_number = Some(block.number);
            }
            StatusChange::Rejected { reason, at } => {
                self.rejected_at = Some(*at);
                self.rejected_reason = Some(reason.clone());
            }
        }
    }
}

/// A transaction together with its reconstructed sub-records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDetail {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub inputs: Vec<CellInput>,
    pub outputs: Vec<CellOutput>,
    pub cell_deps: Vec<CellDep>,
    pub header_deps: Vec<String>,
}

// ─── BlockHeader ─────────────────────────────────────────────────────────────

/// A stored block header. Append-only; the tip is the highest `block_number`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub block_hash: String,
    pub block_number: u64,
    pub parent_hash: String,
    pub proposals_hash: String,
    pub transactions_root: String,
    pub compact_target: u32,
    /// 128-bit nonce, kept as its hex string.
    pub nonce: String,
    /// Unix milliseconds.
    pub timestamp: u64,
    pub version: u32,
    pub epoch: u64,
    pub dao: String,
    pub extra_hash: String,
}

/// The block a status transition happened at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub hash: String,
    pub number: u64,
    /// Unix milliseconds.
    pub timestamp: i64,
}

impl From<&BlockHeader> for BlockRef {
    fn from(header: &BlockHeader) -> Self {
        Self {
            hash: header.block_hash.clone(),
            number: header.block_number,
            timestamp: header.timestamp as i64,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn record(hash: &str) -> TransactionRecord {
        TransactionRecord {
            tx_hash: hash.into(),
            tx_type: TransactionType::Ckb,
            cycles: Some(1_000),
            size: Some(400),
            fee: Some(1_200),
            version: 0,
            witnesses: vec!["0x55".into()],
            parts: None,
        }
    }

    fn block(number: u64) -> BlockRef {
        BlockRef {
            hash: format!("0xb{number}"),
            number,
            timestamp: 1_700_000_000_000 + number as i64,
        }
    }

    #[test]
    fn fresh_row_carries_change_fields() {
        let tx = Transaction::from_record(
            &record("0xaa"),
            &StatusChange::Committed { block: block(7) },
            42,
        );
        assert_eq!(tx.status, TransactionStatus::Committed);
        assert_eq!(tx.committed_at_block_number, Some(7));
        assert_eq!(tx.committed_at_block_hash.as_deref(), Some("0xb7"));
        assert!(tx.enter_pool_at.is_none());
        assert_eq!(tx.last_modified_at, 42);
    }

    #[test]
    fn apply_keeps_earlier_phase_stamps() {
        let mut tx = Transaction::from_record(
            &record("0xaa"),
            &StatusChange::Pending { at: 10 },
            10,
        );
        tx.apply(&StatusChange::Proposing { at: 20 }, 20);
        tx.apply(&StatusChange::Proposed { block: block(3) }, 30);

        assert_eq!(tx.status, TransactionStatus::Proposed);
        assert_eq!(tx.enter_pool_at, Some(10));
        assert_eq!(tx.proposing_at, Some(20));
        assert_eq!(tx.proposed_at_block_number, Some(3));
        assert_eq!(tx.last_modified_at, 30);
    }

    #[test]
    fn transaction_type_serializes_display_names() {
        assert_eq!(serde_json::to_string(&TransactionType::Rgbpp).unwrap(), "\"RGB++\"");
        assert_eq!(serde_json::to_string(&TransactionType::Ckb).unwrap(), "\"CKB\"");
        assert_eq!(TransactionType::from_code(99), TransactionType::Other);
    }

    #[test]
    fn network_parses_case_insensitively() {
        assert_eq!("Testnet".parse::<Network>().unwrap(), Network::Testnet);
        assert!("devnet".parse::<Network>().is_err());
    }
}
