//! Typed CKB node queries over any [`RpcTransport`].

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{json, Value};

use crate::error::TransportError;
use crate::transport::RpcTransport;
use crate::types::{HeaderView, TransactionWithStatus, TxPoolIds};

/// The subset of the CKB RPC used for startup reconciliation.
pub struct NodeClient<T: RpcTransport> {
    transport: T,
    next_id: AtomicU64,
}

impl<T: RpcTransport> NodeClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        self.transport.url()
    }

    fn id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Hashes currently in the pool, split by phase.
    pub async fn get_raw_tx_pool(&self) -> Result<TxPoolIds, TransportError> {
        self.transport
            .call(self.id(), "get_raw_tx_pool", vec![json!(false)])
            .await
    }

    /// `None` when the node has never heard of the hash.
    pub async fn get_transaction(
        &self,
        tx_hash: &str,
    ) -> Result<Option<TransactionWithStatus>, TransportError> {
        let value: Value = self
            .transport
            .call(self.id(), "get_transaction", vec![json!(tx_hash)])
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    pub async fn get_header(&self, block_hash: &str) -> Result<Option<HeaderView>, TransportError> {
        self.transport
            .call(self.id(), "get_header", vec![json!(block_hash)])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{JsonRpcRequest, JsonRpcResponse};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Answers every call with a fixed result and records the methods seen.
    struct Canned {
        result: Value,
        seen: Mutex<Vec<(String, Vec<Value>)>>,
    }

    #[async_trait]
    impl RpcTransport for Canned {
        async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
            self.seen.lock().push((req.method.clone(), req.params.clone()));
            Ok(JsonRpcResponse {
                jsonrpc: "2.0".into(),
                id: req.id,
                result: Some(self.result.clone()),
                error: None,
            })
        }

        fn url(&self) -> &str {
            "mock://node"
        }
    }

    #[tokio::test]
    async fn raw_tx_pool_requests_non_verbose() {
        let node = NodeClient::new(Canned {
            result: json!({"pending": ["0x01"], "proposed": ["0x02"]}),
            seen: Mutex::new(vec![]),
        });
        let pool = node.get_raw_tx_pool().await.unwrap();
        assert_eq!(pool.pending, vec!["0x01"]);
        assert_eq!(pool.proposed, vec!["0x02"]);

        let seen = node.transport.seen.lock();
        assert_eq!(seen[0].0, "get_raw_tx_pool");
        assert_eq!(seen[0].1, vec![json!(false)]);
    }

    #[tokio::test]
    async fn unknown_transaction_is_none() {
        let node = NodeClient::new(Canned {
            result: Value::Null,
            seen: Mutex::new(vec![]),
        });
        assert!(node.get_transaction("0xaa").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transaction_status_decodes() {
        let node = NodeClient::new(Canned {
            result: json!({
                "transaction": null,
                "tx_status": {"status": "committed", "block_hash": "0xb1", "reason": null}
            }),
            seen: Mutex::new(vec![]),
        });
        let tx = node.get_transaction("0xaa").await.unwrap().unwrap();
        assert_eq!(tx.tx_status.status, "committed");
        assert_eq!(tx.tx_status.block_hash.as_deref(), Some("0xb1"));
    }
}
