//! txelevator-rpc: talking to a CKB node.
//!
//! - [`request`]: JSON-RPC 2.0 frames, including subscription pushes
//! - [`transport`]: the [`RpcTransport`] trait
//! - [`http`]: `reqwest`-backed transport with retry
//! - [`node`]: typed queries (`get_raw_tx_pool`, `get_transaction`, ...)
//! - [`types`]: CKB payload shapes and hex quantity decoding

pub mod error;
pub mod http;
pub mod node;
pub mod request;
pub mod retry;
pub mod transport;
pub mod types;

pub use error::TransportError;
pub use http::{HttpClientConfig, HttpRpcClient};
pub use node::NodeClient;
pub use request::{Incoming, JsonRpcError, JsonRpcRequest, JsonRpcResponse, NotificationParams, RpcId};
pub use retry::{RetryConfig, RetryPolicy};
pub use transport::RpcTransport;
pub use types::{
    BlockView, HeaderView, PoolTransactionEntry, PoolTransactionReject, RejectedTransaction,
    TransactionView, TransactionWithStatus, TxPoolIds,
};
