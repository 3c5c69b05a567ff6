//! CKB node JSON payloads, as delivered by the subscription feed and the
//! query RPCs. Numbers travel as `0x`-prefixed hex quantities.

use serde::{Deserialize, Serialize};

use txelevator_core::{DepType, Script};

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_quantity(s: &str) -> Result<u64, String> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| format!("quantity without 0x prefix: {s}"))?;
    if digits.is_empty() {
        return Err(format!("empty quantity: {s}"));
    }
    u64::from_str_radix(digits, 16).map_err(|e| format!("invalid quantity {s}: {e}"))
}

/// `#[serde(with = "quantity")]` for integer fields carried as hex strings.
pub mod quantity {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Copy + Into<u64>,
    {
        serializer.serialize_str(&format!("{:#x}", (*value).into()))
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<u64>,
    {
        let s = String::deserialize(deserializer)?;
        let value = super::parse_quantity(&s).map_err(de::Error::custom)?;
        T::try_from(value).map_err(|_| de::Error::custom(format!("quantity out of range: {s}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutPointView {
    pub tx_hash: String,
    #[serde(with = "quantity")]
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellInputView {
    pub previous_output: OutPointView,
    #[serde(with = "quantity")]
    pub since: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellOutputView {
    #[serde(with = "quantity")]
    pub capacity: u64,
    pub lock: Script,
    #[serde(rename = "type", default)]
    pub type_script: Option<Script>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellDepView {
    pub out_point: OutPointView,
    pub dep_type: DepType,
}

/// A transaction with its hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionView {
    pub hash: String,
    #[serde(with = "quantity")]
    pub version: u32,
    #[serde(default)]
    pub cell_deps: Vec<CellDepView>,
    #[serde(default)]
    pub header_deps: Vec<String>,
    pub inputs: Vec<CellInputView>,
    pub outputs: Vec<CellOutputView>,
    #[serde(default)]
    pub outputs_data: Vec<String>,
    #[serde(default)]
    pub witnesses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderView {
    pub hash: String,
    #[serde(with = "quantity")]
    pub number: u64,
    pub parent_hash: String,
    pub proposals_hash: String,
    pub transactions_root: String,
    #[serde(with = "quantity")]
    pub compact_target: u32,
    /// 128-bit; kept as the hex string.
    pub nonce: String,
    #[serde(with = "quantity")]
    pub timestamp: u64,
    #[serde(with = "quantity")]
    pub version: u32,
    #[serde(with = "quantity")]
    pub epoch: u64,
    pub dao: String,
    pub extra_hash: String,
}

/// Payload of `new_tip_block`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockView {
    pub header: HeaderView,
    /// Short transaction ids proposed by this block.
    #[serde(default)]
    pub proposals: Vec<String>,
    pub transactions: Vec<TransactionView>,
}

/// Payload of `new_transaction` and `proposed_transaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolTransactionEntry {
    pub transaction: TransactionView,
    #[serde(with = "quantity")]
    pub cycles: u64,
    #[serde(with = "quantity")]
    pub size: u64,
    #[serde(with = "quantity")]
    pub fee: u64,
    /// Pool entry time, Unix milliseconds.
    #[serde(with = "quantity")]
    pub timestamp: u64,
}

/// Second element of a `rejected_transaction` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolTransactionReject {
    #[serde(rename = "type")]
    pub reject_type: String,
    pub description: String,
}

impl std::fmt::Display for PoolTransactionReject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.reject_type, self.description)
    }
}

/// Payload of `rejected_transaction`: `[entry, reason]`.
pub type RejectedTransaction = (PoolTransactionEntry, PoolTransactionReject);

/// `get_raw_tx_pool(false)` result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxPoolIds {
    #[serde(default)]
    pub pending: Vec<String>,
    #[serde(default)]
    pub proposed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxStatusView {
    /// `pending`, `proposed`, `committed`, `rejected` or `unknown`.
    pub status: String,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `get_transaction` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionWithStatus {
    #[serde(default)]
    pub transaction: Option<TransactionView>,
    pub tx_status: TxStatusView,
}
