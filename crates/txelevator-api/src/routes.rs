//! Route table and handlers. Every handler is a single store read.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use txelevator_core::{
    BlockHeader, BlockSnapshot, ChainStats, SortOrder, StoreReader, Transaction,
    TransactionDetail, TransactionStatus,
};

use crate::error::ApiError;

pub const DEFAULT_PAGE: usize = 20;
pub const MAX_PAGE: usize = 200;

pub type SharedStore = Arc<dyn StoreReader>;

pub fn router(store: SharedStore) -> Router {
    Router::new()
        .route("/", get(greeting))
        .route("/pending-txs", get(pending))
        .route("/proposing-txs", get(proposing))
        .route("/proposed-txs", get(proposed))
        .route("/rejected-txs", get(rejected))
        .route("/proposed-txs-by-block", get(proposed_by_block))
        .route("/committed-txs", get(committed_by_block))
        .route("/block-header", get(block_header))
        .route("/tip-block-header", get(tip_block_header))
        .route("/tip-block-txs", get(tip_block_txs))
        .route("/all-block-headers", get(all_block_headers))
        .route("/tx", get(transaction))
        .route("/chain-stats", get(chain_stats))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

// ─── Query params ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockHashParams {
    block_hash: Option<String>,
}

impl BlockHashParams {
    fn require(self) -> Result<String, ApiError> {
        self.block_hash
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ApiError::BadRequest("blockHash is required".into()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxHashParams {
    tx_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageParams {
    order: Option<String>,
    limit: Option<String>,
}

impl PageParams {
    fn resolve(self) -> Result<(SortOrder, usize), ApiError> {
        let order = match self.order {
            Some(o) => o.parse::<SortOrder>().map_err(ApiError::BadRequest)?,
            None => SortOrder::default(),
        };
        let limit = match self.limit {
            Some(l) => l
                .parse::<usize>()
                .map_err(|_| ApiError::BadRequest(format!("invalid limit: {l}")))?,
            None => DEFAULT_PAGE,
        };
        Ok((order, limit.clamp(1, MAX_PAGE)))
    }
}

// ─── Handlers ─────────────────────────────────────────────────────────────────

async fn greeting() -> &'static str {
    "TxElevator API"
}

async fn by_status(
    store: &SharedStore,
    status: TransactionStatus,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    Ok(Json(store.transactions_by_status(status).await?))
}

async fn pending(State(store): State<SharedStore>) -> Result<Json<Vec<Transaction>>, ApiError> {
    by_status(&store, TransactionStatus::Pending).await
}

async fn proposing(State(store): State<SharedStore>) -> Result<Json<Vec<Transaction>>, ApiError> {
    by_status(&store, TransactionStatus::Proposing).await
}

async fn proposed(State(store): State<SharedStore>) -> Result<Json<Vec<Transaction>>, ApiError> {
    by_status(&store, TransactionStatus::Proposed).await
}

async fn rejected(State(store): State<SharedStore>) -> Result<Json<Vec<Transaction>>, ApiError> {
    by_status(&store, TransactionStatus::Rejected).await
}

async fn proposed_by_block(
    State(store): State<SharedStore>,
    Query(params): Query<BlockHashParams>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    let hash = params.require()?;
    Ok(Json(store.proposed_transactions_by_block(&hash).await?))
}

async fn committed_by_block(
    State(store): State<SharedStore>,
    Query(params): Query<BlockHashParams>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    let hash = params.require()?;
    Ok(Json(store.committed_transactions_by_block(&hash).await?))
}

async fn block_header(
    State(store): State<SharedStore>,
    Query(params): Query<BlockHashParams>,
) -> Result<Json<BlockHeader>, ApiError> {
    let hash = params.require()?;
    store
        .block_header_by_hash(&hash)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("block header {hash} not found")))
}

async fn tip_block_header(State(store): State<SharedStore>) -> Result<Json<BlockHeader>, ApiError> {
    store
        .tip_block_header()
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no block header stored yet".into()))
}

async fn tip_block_txs(State(store): State<SharedStore>) -> Result<Json<BlockSnapshot>, ApiError> {
    store
        .block_snapshot()
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no block header stored yet".into()))
}

async fn all_block_headers(
    State(store): State<SharedStore>,
    Query(params): Query<PageParams>,
) -> Result<Json<Vec<BlockHeader>>, ApiError> {
    let (order, limit) = params.resolve()?;
    Ok(Json(store.block_headers(order, limit).await?))
}

async fn transaction(
    State(store): State<SharedStore>,
    Query(params): Query<TxHashParams>,
) -> Result<Json<TransactionDetail>, ApiError> {
    let hash = params
        .tx_hash
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ApiError::BadRequest("txHash is required".into()))?;
    store
        .transaction_detail(&hash)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("transaction {hash} not found")))
}

async fn chain_stats(State(store): State<SharedStore>) -> Result<Json<ChainStats>, ApiError> {
    Ok(Json(store.stats().await?))
}
