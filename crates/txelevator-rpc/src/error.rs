//! Transport-level error types.

use thiserror::Error;

use txelevator_core::ElevatorError;

use crate::request::JsonRpcError;

/// Errors that can occur talking to the node.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, timeout, non-2xx status).
    #[error("HTTP error: {0}")]
    Http(String),

    /// WebSocket connection/send/receive error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The endpoint URL or request could not even be constructed.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` if this error is retryable (transient).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::WebSocket(_))
    }
}

impl From<TransportError> for ElevatorError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Deserialization(e) => ElevatorError::Decode(e.to_string()),
            TransportError::InvalidEndpoint(msg) => ElevatorError::Config(msg),
            other => ElevatorError::Rpc(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_failures_retry() {
        assert!(TransportError::Http("refused".into()).is_retryable());
        assert!(TransportError::WebSocket("reset".into()).is_retryable());
        assert!(!TransportError::InvalidEndpoint("nope".into()).is_retryable());
        let rpc = TransportError::Rpc(JsonRpcError {
            code: -1,
            message: "bad".into(),
            data: None,
        });
        assert!(!rpc.is_retryable());
    }

    #[test]
    fn invalid_endpoint_maps_to_config_error() {
        let e: ElevatorError = TransportError::InvalidEndpoint("ftp://x".into()).into();
        assert!(matches!(e, ElevatorError::Config(_)));
    }
}
