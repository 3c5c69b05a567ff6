//! txelevator-core: foundation for the mempool ingestion and fan-out pipeline.
//!
//! # Architecture
//!
//! ```text
//! Subscriber (upstream feed) ──► StoreWriter (single writer)
//!                                     │
//!                                     ▼
//!                         StoreReader (any number of readers)
//!                                     │
//!                      ChangeDetector ─┴─► MessageBus ─► Gateway workers
//! ```
//!
//! This crate owns everything the other crates agree on:
//!
//! - [`TransactionStatus`]: the lifecycle state machine
//! - [`Transaction`] / [`BlockHeader`]: persisted rows
//! - [`ChainSnapshot`] / [`BlockSnapshot`]: point-in-time views
//! - [`classify`]: transaction type classification
//! - [`StoreReader`] / [`StoreWriter`]: the storage contract
//! - [`ElevatorError`]: shared error type

pub mod classify;
pub mod error;
pub mod model;
pub mod snapshot;
pub mod status;
pub mod store;

pub use classify::{classify, is_cellbase, ScriptRegistry};
pub use error::ElevatorError;
pub use model::{
    BlockHeader, BlockRef, CellDep, CellInput, CellOutput, DepType, HashType, Network, Script,
    Transaction, TransactionDetail, TransactionParts, TransactionRecord, TransactionType,
};
pub use snapshot::{BlockSnapshot, ChainSnapshot, ChainStats, ChangeFingerprint, TxFingerprint};
pub use status::TransactionStatus;
pub use store::{
    IgnoreReason, SortOrder, StatusChange, StoreReader, StoreWriter, TxMatch, WriteOutcome,
};

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
