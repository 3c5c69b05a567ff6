//! SQLite storage backend.
//!
//! Persists transactions, block headers and the normalized transaction
//! parts to a single SQLite file. Uses `sqlx` with WAL mode so worker
//! processes can read while the primary writes.
//!
//! # Usage
//! ```rust,no_run
//! use txelevator_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Writer handle (primary only)
//! let writer = SqliteStore::open("./testnet.db").await?;
//!
//! // Read-only handle (gateway workers, HTTP API)
//! let reader = SqliteStore::open_read_only("./testnet.db").await?;
//! # Ok(())
//! # }
//! ```

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use txelevator_core::store::check_transition;
use txelevator_core::{
    now_millis, BlockHeader, BlockSnapshot, CellDep, CellInput, CellOutput, ChainSnapshot,
    DepType, ElevatorError, HashType, IgnoreReason, Script, SortOrder, StatusChange,
    StoreReader, StoreWriter, Transaction, TransactionDetail, TransactionParts,
    TransactionRecord, TransactionStatus, TransactionType, TxFingerprint, TxMatch, WriteOutcome,
};

fn storage(e: sqlx::Error) -> ElevatorError {
    ElevatorError::Storage(e.to_string())
}

const TX_COLUMNS: &str = "id, tx_hash, type, status, cycles, size, fee, version, witnesses,
    enter_pool_at, proposing_at, proposed_at, proposed_at_block_hash, proposed_at_block_number,
    committed_at, committed_at_block_hash, committed_at_block_number,
    rejected_at, rejected_reason, last_modified_at";

const HEADER_COLUMNS: &str = "block_hash, block_number, parent_hash, proposals_hash,
    transactions_root, compact_target, nonce, timestamp, version, epoch, dao, extra_hash";

/// SQLite-backed transaction and block header store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` for writing.
    ///
    /// The path may be a plain file path (`"./testnet.db"`) or a full
    /// SQLite URL (`"sqlite:./testnet.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, ElevatorError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an existing database without write access.
    ///
    /// The schema must already exist (created by the writer's [`open`](Self::open)).
    pub async fn open_read_only(path: &str) -> Result<Self, ElevatorError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}")
        };
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(storage)?
            .read_only(true);
        let pool = SqlitePool::connect_with(options).await.map_err(storage)?;
        Ok(Self { pool })
    }

    /// Open an in-memory database.
    ///
    /// All data is lost when the pool is dropped. Ideal for tests.
    pub async fn in_memory() -> Result<Self, ElevatorError> {
        // one connection: every `:memory:` connection is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), ElevatorError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        let statements = [
            "CREATE TABLE IF NOT EXISTS transactions (
                id                        INTEGER PRIMARY KEY AUTOINCREMENT,
                tx_hash                   TEXT    NOT NULL UNIQUE,
                type                      INTEGER NOT NULL,
                status                    INTEGER NOT NULL,
                cycles                    INTEGER,
                size                      INTEGER,
                fee                       INTEGER,
                version                   INTEGER NOT NULL,
                witnesses                 TEXT    NOT NULL,
                enter_pool_at             INTEGER,
                proposing_at              INTEGER,
                proposed_at               INTEGER,
                proposed_at_block_hash    TEXT,
                proposed_at_block_number  INTEGER,
                committed_at              INTEGER,
                committed_at_block_hash   TEXT,
                committed_at_block_number INTEGER,
                rejected_at               INTEGER,
                rejected_reason           TEXT,
                last_modified_at          INTEGER NOT NULL
            );",
            "CREATE INDEX IF NOT EXISTS idx_tx_status ON transactions (status);",
            "CREATE INDEX IF NOT EXISTS idx_tx_committed_block ON transactions (committed_at_block_hash);",
            "CREATE INDEX IF NOT EXISTS idx_tx_proposed_block ON transactions (proposed_at_block_hash);",
            "CREATE INDEX IF NOT EXISTS idx_tx_last_modified ON transactions (last_modified_at);",
            "CREATE TABLE IF NOT EXISTS block_header (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                block_hash        TEXT    NOT NULL UNIQUE,
                block_number      INTEGER NOT NULL,
                parent_hash       TEXT    NOT NULL,
                proposals_hash    TEXT    NOT NULL,
                transactions_root TEXT    NOT NULL,
                compact_target    INTEGER NOT NULL,
                nonce             TEXT    NOT NULL,
                timestamp         INTEGER NOT NULL,
                version           INTEGER NOT NULL,
                epoch             INTEGER NOT NULL,
                dao               TEXT    NOT NULL,
                extra_hash        TEXT    NOT NULL
            );",
            "CREATE INDEX IF NOT EXISTS idx_block_number ON block_header (block_number);",
            "CREATE TABLE IF NOT EXISTS script (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                code_hash TEXT    NOT NULL,
                hash_type INTEGER NOT NULL,
                args      TEXT    NOT NULL,
                UNIQUE (code_hash, hash_type, args)
            );",
            "CREATE TABLE IF NOT EXISTS input (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                tx_id            INTEGER NOT NULL REFERENCES transactions (id),
                position         INTEGER NOT NULL,
                previous_tx_hash TEXT    NOT NULL,
                previous_index   INTEGER NOT NULL,
                since            INTEGER NOT NULL
            );",
            "CREATE TABLE IF NOT EXISTS output (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                tx_id          INTEGER NOT NULL REFERENCES transactions (id),
                position       INTEGER NOT NULL,
                capacity       INTEGER NOT NULL,
                lock_script_id INTEGER NOT NULL REFERENCES script (id),
                type_script_id INTEGER REFERENCES script (id),
                data           TEXT    NOT NULL
            );",
            "CREATE TABLE IF NOT EXISTS cell_dep (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                tx_id     INTEGER NOT NULL REFERENCES transactions (id),
                position  INTEGER NOT NULL,
                tx_hash   TEXT    NOT NULL,
                out_index INTEGER NOT NULL,
                dep_type  INTEGER NOT NULL
            );",
            "CREATE TABLE IF NOT EXISTS header_dep (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                tx_id       INTEGER NOT NULL REFERENCES transactions (id),
                position    INTEGER NOT NULL,
                header_hash TEXT    NOT NULL
            );",
            "CREATE INDEX IF NOT EXISTS idx_input_tx ON input (tx_id);",
            "CREATE INDEX IF NOT EXISTS idx_output_tx ON output (tx_id);",
            "CREATE INDEX IF NOT EXISTS idx_cell_dep_tx ON cell_dep (tx_id);",
            "CREATE INDEX IF NOT EXISTS idx_header_dep_tx ON header_dep (tx_id);",
        ];
        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(storage)?;
        }
        Ok(())
    }
}

// ─── Row mapping ─────────────────────────────────────────────────────────────

fn opt_u64(row: &SqliteRow, column: &str) -> Option<u64> {
    row.get::<Option<i64>, _>(column).map(|v| v as u64)
}

fn row_to_tx(row: &SqliteRow) -> Result<Transaction, ElevatorError> {
    let status_code: i64 = row.get("status");
    let status = TransactionStatus::from_code(status_code)
        .ok_or_else(|| ElevatorError::Decode(format!("unknown status code {status_code}")))?;
    let witnesses: String = row.get("witnesses");
    Ok(Transaction {
        tx_hash: row.get("tx_hash"),
        tx_type: TransactionType::from_code(row.get("type")),
        status,
        cycles: opt_u64(row, "cycles"),
        size: opt_u64(row, "size"),
        fee: opt_u64(row, "fee"),
        version: row.get::<i64, _>("version") as u32,
        witnesses: serde_json::from_str(&witnesses)?,
        enter_pool_at: row.get("enter_pool_at"),
        proposing_at: row.get("proposing_at"),
        proposed_at: row.get("proposed_at"),
        proposed_at_block_hash: row.get("proposed_at_block_hash"),
        proposed_at_block_number: opt_u64(row, "proposed_at_block_number"),
        committed_at: row.get("committed_at"),
        committed_at_block_hash: row.get("committed_at_block_hash"),
        committed_at_block_number: opt_u64(row, "committed_at_block_number"),
        rejected_at: row.get("rejected_at"),
        rejected_reason: row.get("rejected_reason"),
        last_modified_at: row.get("last_modified_at"),
    })
}

fn rows_to_txs(rows: Vec<SqliteRow>) -> Result<Vec<Transaction>, ElevatorError> {
    rows.iter().map(row_to_tx).collect()
}

fn row_to_header(row: &SqliteRow) -> BlockHeader {
    BlockHeader {
        block_hash: row.get("block_hash"),
        block_number: row.get::<i64, _>("block_number") as u64,
        parent_hash: row.get("parent_hash"),
        proposals_hash: row.get("proposals_hash"),
        transactions_root: row.get("transactions_root"),
        compact_target: row.get::<i64, _>("compact_target") as u32,
        nonce: row.get("nonce"),
        timestamp: row.get::<i64, _>("timestamp") as u64,
        version: row.get::<i64, _>("version") as u32,
        epoch: row.get::<i64, _>("epoch") as u64,
        dao: row.get("dao"),
        extra_hash: row.get("extra_hash"),
    }
}

fn hash_type(code: i64) -> Result<HashType, ElevatorError> {
    HashType::from_code(code).ok_or_else(|| ElevatorError::Decode(format!("unknown hash type {code}")))
}

// ─── Queries ─────────────────────────────────────────────────────────────────
//
// Every query takes a connection so the same code runs on a pooled
// connection or inside a transaction.

async fn find_by_hash(
    conn: &mut SqliteConnection,
    tx_hash: &str,
) -> Result<Option<(i64, Transaction)>, ElevatorError> {
    let row = sqlx::query(&format!(
        "SELECT {TX_COLUMNS} FROM transactions WHERE tx_hash = ?"
    ))
    .bind(tx_hash.to_ascii_lowercase())
    .fetch_optional(&mut *conn)
    .await
    .map_err(storage)?;

    match row {
        Some(row) => Ok(Some((row.get("id"), row_to_tx(&row)?))),
        None => Ok(None),
    }
}

async fn find_non_terminal_by_prefix(
    conn: &mut SqliteConnection,
    prefix: &str,
) -> Result<Vec<(i64, Transaction)>, ElevatorError> {
    let rows = sqlx::query(&format!(
        "SELECT {TX_COLUMNS} FROM transactions
         WHERE tx_hash LIKE ? || '%' AND status IN (?, ?, ?)
         ORDER BY id"
    ))
    .bind(prefix.to_ascii_lowercase())
    .bind(TransactionStatus::Pending.code())
    .bind(TransactionStatus::Proposing.code())
    .bind(TransactionStatus::Proposed.code())
    .fetch_all(&mut *conn)
    .await
    .map_err(storage)?;

    let mut found = Vec::with_capacity(rows.len());
    for row in &rows {
        found.push((row.get::<i64, _>("id"), row_to_tx(row)?));
    }
    Ok(found)
}

async fn by_status(
    conn: &mut SqliteConnection,
    status: TransactionStatus,
) -> Result<Vec<Transaction>, ElevatorError> {
    let rows = sqlx::query(&format!(
        "SELECT {TX_COLUMNS} FROM transactions WHERE status = ? ORDER BY id"
    ))
    .bind(status.code())
    .fetch_all(&mut *conn)
    .await
    .map_err(storage)?;
    rows_to_txs(rows)
}

async fn committed_in_block(
    conn: &mut SqliteConnection,
    block_hash: &str,
) -> Result<Vec<Transaction>, ElevatorError> {
    let rows = sqlx::query(&format!(
        "SELECT {TX_COLUMNS} FROM transactions
         WHERE committed_at_block_hash = ? AND status = ? ORDER BY id"
    ))
    .bind(block_hash)
    .bind(TransactionStatus::Committed.code())
    .fetch_all(&mut *conn)
    .await
    .map_err(storage)?;
    rows_to_txs(rows)
}

async fn proposed_in_block(
    conn: &mut SqliteConnection,
    block_hash: &str,
) -> Result<Vec<Transaction>, ElevatorError> {
    let rows = sqlx::query(&format!(
        "SELECT {TX_COLUMNS} FROM transactions
         WHERE proposed_at_block_hash = ? ORDER BY id"
    ))
    .bind(block_hash)
    .fetch_all(&mut *conn)
    .await
    .map_err(storage)?;
    rows_to_txs(rows)
}

async fn tip_header(conn: &mut SqliteConnection) -> Result<Option<BlockHeader>, ElevatorError> {
    let row = sqlx::query(&format!(
        "SELECT {HEADER_COLUMNS} FROM block_header ORDER BY block_number DESC LIMIT 1"
    ))
    .fetch_optional(&mut *conn)
    .await
    .map_err(storage)?;
    Ok(row.as_ref().map(row_to_header))
}

async fn insert_transaction(
    conn: &mut SqliteConnection,
    tx: &Transaction,
) -> Result<i64, ElevatorError> {
    let witnesses = serde_json::to_string(&tx.witnesses)?;
    let result = sqlx::query(
        "INSERT INTO transactions (tx_hash, type, status, cycles, size, fee, version, witnesses,
            enter_pool_at, proposing_at, proposed_at, proposed_at_block_hash,
            proposed_at_block_number, committed_at, committed_at_block_hash,
            committed_at_block_number, rejected_at, rejected_reason, last_modified_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&tx.tx_hash)
    .bind(tx.tx_type.code())
    .bind(tx.status.code())
    .bind(tx.cycles.map(|v| v as i64))
    .bind(tx.size.map(|v| v as i64))
    .bind(tx.fee.map(|v| v as i64))
    .bind(tx.version as i64)
    .bind(&witnesses)
    .bind(tx.enter_pool_at)
    .bind(tx.proposing_at)
    .bind(tx.proposed_at)
    .bind(&tx.proposed_at_block_hash)
    .bind(tx.proposed_at_block_number.map(|v| v as i64))
    .bind(tx.committed_at)
    .bind(&tx.committed_at_block_hash)
    .bind(tx.committed_at_block_number.map(|v| v as i64))
    .bind(tx.rejected_at)
    .bind(&tx.rejected_reason)
    .bind(tx.last_modified_at)
    .execute(&mut *conn)
    .await
    .map_err(storage)?;
    Ok(result.last_insert_rowid())
}

async fn update_transaction(
    conn: &mut SqliteConnection,
    id: i64,
    tx: &Transaction,
) -> Result<(), ElevatorError> {
    sqlx::query(
        "UPDATE transactions SET status = ?,
            enter_pool_at = ?, proposing_at = ?, proposed_at = ?,
            proposed_at_block_hash = ?, proposed_at_block_number = ?,
            committed_at = ?, committed_at_block_hash = ?, committed_at_block_number = ?,
            rejected_at = ?, rejected_reason = ?, last_modified_at = ?
         WHERE id = ?",
    )
    .bind(tx.status.code())
    .bind(tx.enter_pool_at)
    .bind(tx.proposing_at)
    .bind(tx.proposed_at)
    .bind(&tx.proposed_at_block_hash)
    .bind(tx.proposed_at_block_number.map(|v| v as i64))
    .bind(tx.committed_at)
    .bind(&tx.committed_at_block_hash)
    .bind(tx.committed_at_block_number.map(|v| v as i64))
    .bind(tx.rejected_at)
    .bind(&tx.rejected_reason)
    .bind(tx.last_modified_at)
    .bind(id)
    .execute(&mut *conn)
    .await
    .map_err(storage)?;
    Ok(())
}

/// Insert a script once per distinct content and return its id.
async fn upsert_script(conn: &mut SqliteConnection, script: &Script) -> Result<i64, ElevatorError> {
    sqlx::query("INSERT OR IGNORE INTO script (code_hash, hash_type, args) VALUES (?, ?, ?)")
        .bind(&script.code_hash)
        .bind(script.hash_type.code())
        .bind(&script.args)
        .execute(&mut *conn)
        .await
        .map_err(storage)?;

    let row = sqlx::query("SELECT id FROM script WHERE code_hash = ? AND hash_type = ? AND args = ?")
        .bind(&script.code_hash)
        .bind(script.hash_type.code())
        .bind(&script.args)
        .fetch_one(&mut *conn)
        .await
        .map_err(storage)?;
    Ok(row.get("id"))
}

async fn insert_parts(
    conn: &mut SqliteConnection,
    tx_id: i64,
    parts: &TransactionParts,
) -> Result<(), ElevatorError> {
    for (position, input) in parts.inputs.iter().enumerate() {
        sqlx::query(
            "INSERT INTO input (tx_id, position, previous_tx_hash, previous_index, since)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(tx_id)
        .bind(position as i64)
        .bind(&input.previous_tx_hash)
        .bind(input.previous_index as i64)
        .bind(input.since as i64)
        .execute(&mut *conn)
        .await
        .map_err(storage)?;
    }

    for (position, output) in parts.outputs.iter().enumerate() {
        let lock_id = upsert_script(conn, &output.lock).await?;
        let type_id = match &output.type_script {
            Some(script) => Some(upsert_script(conn, script).await?),
            None => None,
        };
        sqlx::query(
            "INSERT INTO output (tx_id, position, capacity, lock_script_id, type_script_id, data)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(tx_id)
        .bind(position as i64)
        .bind(output.capacity as i64)
        .bind(lock_id)
        .bind(type_id)
        .bind(&output.data)
        .execute(&mut *conn)
        .await
        .map_err(storage)?;
    }

    for (position, dep) in parts.cell_deps.iter().enumerate() {
        sqlx::query(
            "INSERT INTO cell_dep (tx_id, position, tx_hash, out_index, dep_type)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(tx_id)
        .bind(position as i64)
        .bind(&dep.tx_hash)
        .bind(dep.index as i64)
        .bind(dep.dep_type.code())
        .execute(&mut *conn)
        .await
        .map_err(storage)?;
    }

    for (position, header_hash) in parts.header_deps.iter().enumerate() {
        sqlx::query("INSERT INTO header_dep (tx_id, position, header_hash) VALUES (?, ?, ?)")
            .bind(tx_id)
            .bind(position as i64)
            .bind(header_hash)
            .execute(&mut *conn)
            .await
            .map_err(storage)?;
    }
    Ok(())
}

async fn load_parts(
    conn: &mut SqliteConnection,
    tx_id: i64,
) -> Result<TransactionParts, ElevatorError> {
    let inputs = sqlx::query(
        "SELECT previous_tx_hash, previous_index, since FROM input
         WHERE tx_id = ? ORDER BY position",
    )
    .bind(tx_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(storage)?
    .iter()
    .map(|r| CellInput {
        previous_tx_hash: r.get("previous_tx_hash"),
        previous_index: r.get::<i64, _>("previous_index") as u32,
        since: r.get::<i64, _>("since") as u64,
    })
    .collect();

    let output_rows = sqlx::query(
        "SELECT o.capacity, o.data,
                l.code_hash AS lock_code_hash, l.hash_type AS lock_hash_type, l.args AS lock_args,
                t.code_hash AS type_code_hash, t.hash_type AS type_hash_type, t.args AS type_args
         FROM output o
         JOIN script l ON l.id = o.lock_script_id
         LEFT JOIN script t ON t.id = o.type_script_id
         WHERE o.tx_id = ? ORDER BY o.position",
    )
    .bind(tx_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(storage)?;

    let mut outputs = Vec::with_capacity(output_rows.len());
    for r in &output_rows {
        let type_script = match r.get::<Option<String>, _>("type_code_hash") {
            Some(code_hash) => Some(Script {
                code_hash,
                hash_type: hash_type(r.get::<Option<i64>, _>("type_hash_type").unwrap_or_default())?,
                args: r.get::<Option<String>, _>("type_args").unwrap_or_default(),
            }),
            None => None,
        };
        outputs.push(CellOutput {
            capacity: r.get::<i64, _>("capacity") as u64,
            lock: Script {
                code_hash: r.get("lock_code_hash"),
                hash_type: hash_type(r.get("lock_hash_type"))?,
                args: r.get("lock_args"),
            },
            type_script,
            data: r.get("data"),
        });
    }

    let dep_rows = sqlx::query(
        "SELECT tx_hash, out_index, dep_type FROM cell_dep WHERE tx_id = ? ORDER BY position",
    )
    .bind(tx_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(storage)?;

    let mut cell_deps = Vec::with_capacity(dep_rows.len());
    for r in &dep_rows {
        let code: i64 = r.get("dep_type");
        cell_deps.push(CellDep {
            tx_hash: r.get("tx_hash"),
            index: r.get::<i64, _>("out_index") as u32,
            dep_type: DepType::from_code(code)
                .ok_or_else(|| ElevatorError::Decode(format!("unknown dep type {code}")))?,
        });
    }

    let header_deps = sqlx::query(
        "SELECT header_hash FROM header_dep WHERE tx_id = ? ORDER BY position",
    )
    .bind(tx_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(storage)?
    .iter()
    .map(|r| r.get("header_hash"))
    .collect();

    Ok(TransactionParts {
        inputs,
        outputs,
        cell_deps,
        header_deps,
    })
}

// ─── StoreReader impl ────────────────────────────────────────────────────────

#[async_trait]
impl StoreReader for SqliteStore {
    async fn transactions_by_status(
        &self,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, ElevatorError> {
        let mut conn = self.pool.acquire().await.map_err(storage)?;
        by_status(&mut conn, status).await
    }

    async fn committed_transactions_by_block(
        &self,
        block_hash: &str,
    ) -> Result<Vec<Transaction>, ElevatorError> {
        let mut conn = self.pool.acquire().await.map_err(storage)?;
        committed_in_block(&mut conn, block_hash).await
    }

    async fn proposed_transactions_by_block(
        &self,
        block_hash: &str,
    ) -> Result<Vec<Transaction>, ElevatorError> {
        let mut conn = self.pool.acquire().await.map_err(storage)?;
        proposed_in_block(&mut conn, block_hash).await
    }

    async fn transaction_by_hash(
        &self,
        tx_hash: &str,
    ) -> Result<Option<Transaction>, ElevatorError> {
        let mut conn = self.pool.acquire().await.map_err(storage)?;
        Ok(find_by_hash(&mut conn, tx_hash).await?.map(|(_, tx)| tx))
    }

    async fn transactions_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<Transaction>, ElevatorError> {
        let rows = sqlx::query(&format!(
            "SELECT {TX_COLUMNS} FROM transactions WHERE tx_hash LIKE ? || '%' ORDER BY id"
        ))
        .bind(prefix.to_ascii_lowercase())
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows_to_txs(rows)
    }

    async fn transaction_detail(
        &self,
        tx_hash: &str,
    ) -> Result<Option<TransactionDetail>, ElevatorError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        let Some((id, transaction)) = find_by_hash(&mut tx, tx_hash).await? else {
            return Ok(None);
        };
        let parts = load_parts(&mut tx, id).await?;
        tx.commit().await.map_err(storage)?;
        Ok(Some(TransactionDetail {
            transaction,
            inputs: parts.inputs,
            outputs: parts.outputs,
            cell_deps: parts.cell_deps,
            header_deps: parts.header_deps,
        }))
    }

    async fn non_terminal_transactions(&self) -> Result<Vec<Transaction>, ElevatorError> {
        let rows = sqlx::query(&format!(
            "SELECT {TX_COLUMNS} FROM transactions WHERE status IN (?, ?, ?) ORDER BY id"
        ))
        .bind(TransactionStatus::Pending.code())
        .bind(TransactionStatus::Proposing.code())
        .bind(TransactionStatus::Proposed.code())
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows_to_txs(rows)
    }

    async fn block_header_by_hash(
        &self,
        block_hash: &str,
    ) -> Result<Option<BlockHeader>, ElevatorError> {
        let row = sqlx::query(&format!(
            "SELECT {HEADER_COLUMNS} FROM block_header WHERE block_hash = ?"
        ))
        .bind(block_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        Ok(row.as_ref().map(row_to_header))
    }

    async fn tip_block_header(&self) -> Result<Option<BlockHeader>, ElevatorError> {
        let mut conn = self.pool.acquire().await.map_err(storage)?;
        tip_header(&mut conn).await
    }

    async fn tip_block_number(&self) -> Result<Option<u64>, ElevatorError> {
        let row = sqlx::query("SELECT MAX(block_number) AS tip FROM block_header")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.get::<Option<i64>, _>("tip").map(|n| n as u64))
    }

    async fn block_headers(
        &self,
        order: SortOrder,
        limit: usize,
    ) -> Result<Vec<BlockHeader>, ElevatorError> {
        let direction = match order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        let rows = sqlx::query(&format!(
            "SELECT {HEADER_COLUMNS} FROM block_header ORDER BY block_number {direction} LIMIT ?"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        Ok(rows.iter().map(row_to_header).collect())
    }

    async fn last_modified_fingerprint(
        &self,
        exclude: Option<TransactionStatus>,
    ) -> Result<Option<TxFingerprint>, ElevatorError> {
        let row = match exclude {
            Some(status) => sqlx::query(
                "SELECT tx_hash, status, last_modified_at FROM transactions
                 WHERE status != ? ORDER BY last_modified_at DESC, id DESC LIMIT 1",
            )
            .bind(status.code())
            .fetch_optional(&self.pool)
            .await,
            None => sqlx::query(
                "SELECT tx_hash, status, last_modified_at FROM transactions
                 ORDER BY last_modified_at DESC, id DESC LIMIT 1",
            )
            .fetch_optional(&self.pool)
            .await,
        }
        .map_err(storage)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let code: i64 = row.get("status");
        Ok(Some(TxFingerprint {
            tx_hash: row.get("tx_hash"),
            status: TransactionStatus::from_code(code)
                .ok_or_else(|| ElevatorError::Decode(format!("unknown status code {code}")))?,
            last_modified_at: row.get("last_modified_at"),
        }))
    }

    async fn count_by_status(&self, status: TransactionStatus) -> Result<u64, ElevatorError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM transactions WHERE status = ?")
            .bind(status.code())
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }

    /// Read inside one transaction so the four lists agree with each other.
    async fn chain_snapshot(&self) -> Result<ChainSnapshot, ElevatorError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        let tip = tip_header(&mut tx).await?;
        let tip_committed_transactions = match &tip {
            Some(header) => committed_in_block(&mut tx, &header.block_hash).await?,
            None => Vec::new(),
        };
        let snapshot = ChainSnapshot {
            tip_block_number: tip.map(|h| h.block_number),
            tip_committed_transactions,
            pending_transactions: by_status(&mut tx, TransactionStatus::Pending).await?,
            proposing_transactions: by_status(&mut tx, TransactionStatus::Proposing).await?,
            proposed_transactions: by_status(&mut tx, TransactionStatus::Proposed).await?,
        };
        tx.commit().await.map_err(storage)?;
        Ok(snapshot)
    }

    async fn block_snapshot(&self) -> Result<Option<BlockSnapshot>, ElevatorError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        let Some(block_header) = tip_header(&mut tx).await? else {
            return Ok(None);
        };
        let committed_transactions = committed_in_block(&mut tx, &block_header.block_hash).await?;
        let proposed_transactions = proposed_in_block(&mut tx, &block_header.block_hash).await?;
        tx.commit().await.map_err(storage)?;
        Ok(Some(BlockSnapshot {
            block_header,
            committed_transactions,
            proposed_transactions,
        }))
    }
}

// ─── StoreWriter impl ────────────────────────────────────────────────────────

#[async_trait]
impl StoreWriter for SqliteStore {
    async fn apply(
        &self,
        target: &TxMatch,
        change: StatusChange,
        record: Option<&TransactionRecord>,
    ) -> Result<WriteOutcome, ElevatorError> {
        let now = now_millis();
        let mut db = self.pool.begin().await.map_err(storage)?;

        let found = match target {
            TxMatch::Hash(hash) => find_by_hash(&mut db, hash).await?,
            TxMatch::ShortId(prefix) => {
                let mut matches = find_non_terminal_by_prefix(&mut db, prefix).await?;
                if matches.len() > 1 {
                    return Ok(WriteOutcome::Ignored(IgnoreReason::Ambiguous {
                        matches: matches.len(),
                    }));
                }
                matches.pop()
            }
        };

        let outcome = match found {
            Some((id, mut tx)) => {
                let from = tx.status;
                let to = change.status();
                if let Err(reason) = check_transition(from, to) {
                    return Ok(WriteOutcome::Ignored(reason));
                }
                tx.apply(&change, now);
                update_transaction(&mut db, id, &tx).await?;
                debug!(tx_hash = %tx.tx_hash, %from, %to, "transaction transitioned");
                WriteOutcome::Transitioned { from, to }
            }
            None => {
                let Some(record) = record else {
                    return Ok(WriteOutcome::Ignored(IgnoreReason::NotFound));
                };
                let mut tx = Transaction::from_record(record, &change, now);
                tx.tx_hash = tx.tx_hash.to_ascii_lowercase();
                let id = insert_transaction(&mut db, &tx).await?;
                if let Some(parts) = &record.parts {
                    insert_parts(&mut db, id, parts).await?;
                }
                debug!(tx_hash = %tx.tx_hash, status = %tx.status, "transaction inserted");
                WriteOutcome::Inserted
            }
        };

        db.commit().await.map_err(storage)?;
        Ok(outcome)
    }

    async fn save_block_header(&self, header: &BlockHeader) -> Result<bool, ElevatorError> {
        let result = sqlx::query(&format!(
            "INSERT OR IGNORE INTO block_header ({HEADER_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&header.block_hash)
        .bind(header.block_number as i64)
        .bind(&header.parent_hash)
        .bind(&header.proposals_hash)
        .bind(&header.transactions_root)
        .bind(header.compact_target as i64)
        .bind(&header.nonce)
        .bind(header.timestamp as i64)
        .bind(header.version as i64)
        .bind(header.epoch as i64)
        .bind(&header.dao)
        .bind(&header.extra_hash)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        let inserted = result.rows_affected() == 1;
        if inserted {
            debug!(number = header.block_number, hash = %header.block_hash, "block header stored");
        }
        Ok(inserted)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
