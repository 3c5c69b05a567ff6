//! txelevator-api: read-only HTTP queries over a [`StoreReader`](txelevator_core::StoreReader).

pub mod error;
pub mod routes;

pub use error::ApiError;
pub use routes::{router, SharedStore, DEFAULT_PAGE, MAX_PAGE};

use tokio::net::TcpListener;
use tracing::info;

/// Serve the query routes until the listener fails.
pub async fn serve(listener: TcpListener, store: SharedStore) -> std::io::Result<()> {
    info!(addr = ?listener.local_addr().ok(), "http api listening");
    axum::serve(listener, router(store)).await
}
