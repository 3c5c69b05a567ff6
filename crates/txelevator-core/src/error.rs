//! Error types shared across the pipeline.

use thiserror::Error;

/// Errors raised by the store, the upstream subscriber and the broadcaster.
#[derive(Debug, Error)]
pub enum ElevatorError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for ElevatorError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
