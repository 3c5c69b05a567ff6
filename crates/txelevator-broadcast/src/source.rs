//! What a detector watches: a cheap fingerprint and the expensive
//! snapshot it stands for.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use txelevator_core::{ChangeFingerprint, ElevatorError, StoreReader, TransactionStatus};

use crate::bus::MessageKind;

#[async_trait]
pub trait ChangeSource: Send + Sync {
    fn kind(&self) -> MessageKind;

    /// Cheap read compared tick to tick.
    async fn fingerprint(&self) -> Result<ChangeFingerprint, ElevatorError>;

    /// Full read, already encoded. `None` when there is nothing to publish yet.
    async fn snapshot(&self) -> Result<Option<Value>, ElevatorError>;
}

/// Pool phases plus the tip block's committed transactions.
///
/// Committed rows are left out of the fingerprint: they only change
/// together with the tip, which the fingerprint already carries.
pub struct ChainSnapshotSource {
    store: Arc<dyn StoreReader>,
}

impl ChainSnapshotSource {
    pub fn new(store: Arc<dyn StoreReader>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ChangeSource for ChainSnapshotSource {
    fn kind(&self) -> MessageKind {
        MessageKind::NewSnapshot
    }

    async fn fingerprint(&self) -> Result<ChangeFingerprint, ElevatorError> {
        self.store
            .change_fingerprint(Some(TransactionStatus::Committed))
            .await
    }

    async fn snapshot(&self) -> Result<Option<Value>, ElevatorError> {
        let snapshot = self.store.chain_snapshot().await?;
        Ok(Some(serde_json::to_value(snapshot)?))
    }
}

/// The tip block with its committed and proposed transactions.
pub struct TipBlockSource {
    store: Arc<dyn StoreReader>,
}

impl TipBlockSource {
    pub fn new(store: Arc<dyn StoreReader>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ChangeSource for TipBlockSource {
    fn kind(&self) -> MessageKind {
        MessageKind::NewBlock
    }

    async fn fingerprint(&self) -> Result<ChangeFingerprint, ElevatorError> {
        Ok(ChangeFingerprint {
            tip_block_number: self.store.tip_block_number().await?,
            last_modified: None,
        })
    }

    async fn snapshot(&self) -> Result<Option<Value>, ElevatorError> {
        match self.store.block_snapshot().await? {
            Some(snapshot) => Ok(Some(serde_json::to_value(snapshot)?)),
            None => Ok(None),
        }
    }
}
