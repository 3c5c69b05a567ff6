//! Point-in-time views re-published to subscribers, and the cheap
//! fingerprints used to decide whether a new view is needed.

use serde::{Deserialize, Serialize};

use crate::model::{BlockHeader, Transaction};
use crate::status::TransactionStatus;

/// Full view of the pool phases plus the tip block's committed transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSnapshot {
    pub tip_block_number: Option<u64>,
    pub tip_committed_transactions: Vec<Transaction>,
    pub pending_transactions: Vec<Transaction>,
    pub proposing_transactions: Vec<Transaction>,
    pub proposed_transactions: Vec<Transaction>,
}

/// The tip block header with its committed and proposed transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSnapshot {
    pub block_header: BlockHeader,
    pub committed_transactions: Vec<Transaction>,
    pub proposed_transactions: Vec<Transaction>,
}

/// Identity of the most recently written transaction row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxFingerprint {
    pub tx_hash: String,
    pub status: TransactionStatus,
    pub last_modified_at: i64,
}

/// Compared tick-to-tick by the snapshot detector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeFingerprint {
    pub tip_block_number: Option<u64>,
    pub last_modified: Option<TxFingerprint>,
}

/// Aggregate counters served by the HTTP surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStats {
    pub pending_count: u64,
    pub proposing_count: u64,
    pub proposed_count: u64,
    pub committed_count: u64,
    pub rejected_count: u64,
    pub tip_block_number: Option<u64>,
    /// Mean seconds between the sampled headers, two decimals.
    pub average_block_time: f64,
}

impl ChainStats {
    pub fn set_count(&mut self, status: TransactionStatus, count: u64) {
        match status {
            TransactionStatus::Pending => self.pending_count = count,
            TransactionStatus::Proposing => self.proposing_count = count,
            TransactionStatus::Proposed => self.proposed_count = count,
            TransactionStatus::Committed => self.committed_count = count,
            TransactionStatus::Rejected => self.rejected_count = count,
        }
    }
}

/// Mean interval in seconds between consecutive headers (newest first).
pub fn average_block_interval(headers_desc: &[BlockHeader]) -> f64 {
    if headers_desc.len() < 2 {
        return 0.0;
    }
    let total_ms: i64 = headers_desc
        .windows(2)
        .map(|w| w[0].timestamp as i64 - w[1].timestamp as i64)
        .sum();
    let mean_secs = total_ms as f64 / (headers_desc.len() - 1) as f64 / 1000.0;
    (mean_secs * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(number: u64, timestamp: u64) -> BlockHeader {
        BlockHeader {
            block_hash: format!("0x{number:x}"),
            block_number: number,
            parent_hash: String::new(),
            proposals_hash: String::new(),
            transactions_root: String::new(),
            compact_target: 0,
            nonce: "0x0".into(),
            timestamp,
            version: 0,
            epoch: 0,
            dao: String::new(),
            extra_hash: String::new(),
        }
    }

    #[test]
    fn average_interval_over_descending_headers() {
        let headers = vec![header(3, 24_000), header(2, 16_000), header(1, 8_000)];
        assert_eq!(average_block_interval(&headers), 8.0);
    }

    #[test]
    fn average_interval_rounds_to_two_decimals() {
        let headers = vec![header(2, 10_333), header(1, 0)];
        assert_eq!(average_block_interval(&headers), 10.33);
    }

    #[test]
    fn average_interval_needs_two_headers() {
        assert_eq!(average_block_interval(&[]), 0.0);
        assert_eq!(average_block_interval(&[header(1, 1)]), 0.0);
    }

    #[test]
    fn chain_snapshot_uses_camel_case() {
        let json = serde_json::to_value(ChainSnapshot::default()).unwrap();
        assert!(json.get("pendingTransactions").is_some());
        assert!(json.get("tipCommittedTransactions").is_some());
    }
}
