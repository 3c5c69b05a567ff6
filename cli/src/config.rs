//! Command-line and environment configuration.

use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use txelevator_core::Network;

pub const DEFAULT_TESTNET_WS: &str = "wss://testnet.ckb.dev/ws";
pub const DEFAULT_TESTNET_HTTP: &str = "https://testnet.ckb.dev";
pub const DEFAULT_TESTNET_DB: &str = "./ckb-testnet.db";
pub const DEFAULT_MAINNET_WS: &str = "wss://mainnet.ckb.dev/ws";
pub const DEFAULT_MAINNET_HTTP: &str = "https://mainnet.ckb.dev";
pub const DEFAULT_MAINNET_DB: &str = "./ckb-mainnet.db";

#[derive(Parser, Debug)]
#[command(
    name = "txelevator",
    about = "Live CKB mempool tracker with snapshot fan-out",
    long_about = "
TxElevator follows a CKB node's event feed, records every transaction's
pool lifecycle in SQLite and pushes full snapshots to WebSocket clients.

ENVIRONMENT VARIABLES:
  TESTNET_WS_RPC_URL / MAINNET_WS_RPC_URL        node event feed
  TESTNET_HTTP_RPC_URL / MAINNET_HTTP_RPC_URL    node JSON-RPC (startup reconciliation)
  TESTNET_DATABASE_FILE / MAINNET_DATABASE_FILE  SQLite database
  API_HTTP_PORT / API_WS_PORT                    listening ports
  LOG_LEVEL                                      default log level
",
    version
)]
pub struct Cli {
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the subscriber, detectors, gateway workers and HTTP API
    Run(RunArgs),
    /// Print tip and per-status counts from a database
    Status(NodeArgs),
    /// Print default configuration
    Info,
}

// ─── Node / database selection ────────────────────────────────────────────────

#[derive(Args, Debug, Clone)]
pub struct NodeArgs {
    #[arg(long, default_value = "testnet")]
    pub network: Network,

    #[arg(long, env = "TESTNET_WS_RPC_URL", default_value = DEFAULT_TESTNET_WS)]
    pub testnet_ws_url: String,
    #[arg(long, env = "TESTNET_HTTP_RPC_URL", default_value = DEFAULT_TESTNET_HTTP)]
    pub testnet_http_url: String,
    #[arg(long, env = "TESTNET_DATABASE_FILE", default_value = DEFAULT_TESTNET_DB)]
    pub testnet_database_file: String,

    #[arg(long, env = "MAINNET_WS_RPC_URL", default_value = DEFAULT_MAINNET_WS)]
    pub mainnet_ws_url: String,
    #[arg(long, env = "MAINNET_HTTP_RPC_URL", default_value = DEFAULT_MAINNET_HTTP)]
    pub mainnet_http_url: String,
    #[arg(long, env = "MAINNET_DATABASE_FILE", default_value = DEFAULT_MAINNET_DB)]
    pub mainnet_database_file: String,
}

/// The endpoints and database of the selected network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSettings {
    pub network: Network,
    pub ws_url: String,
    pub http_url: String,
    pub database_file: String,
}

impl NodeArgs {
    pub fn resolve(&self) -> NodeSettings {
        let (ws_url, http_url, database_file) = match self.network {
            Network::Testnet => (
                &self.testnet_ws_url,
                &self.testnet_http_url,
                &self.testnet_database_file,
            ),
            Network::Mainnet => (
                &self.mainnet_ws_url,
                &self.mainnet_http_url,
                &self.mainnet_database_file,
            ),
        };
        NodeSettings {
            network: self.network,
            ws_url: ws_url.clone(),
            http_url: http_url.clone(),
            database_file: database_file.clone(),
        }
    }
}

// ─── run ──────────────────────────────────────────────────────────────────────

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub node: NodeArgs,

    /// Gateway workers (default: one per CPU)
    #[arg(long)]
    pub workers: Option<usize>,

    #[arg(long, env = "API_HTTP_PORT", default_value_t = 3000)]
    pub http_port: u16,

    #[arg(long, env = "API_WS_PORT", default_value_t = 3001)]
    pub ws_port: u16,

    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// Change detector poll interval in milliseconds
    #[arg(long, default_value_t = 1_000)]
    pub poll_ms: u64,

    /// Detector liveness check interval in milliseconds
    #[arg(long, default_value_t = 5_000)]
    pub liveness_ms: u64,

    /// Pause after a failed node connect attempt, in milliseconds
    #[arg(long, default_value_t = 1_000)]
    pub reconnect_ms: u64,

    /// Messages a worker may fall behind before it skips ahead
    #[arg(long, default_value_t = 64)]
    pub bus_capacity: usize,

    /// Skip comparing local rows against the node pool at startup
    #[arg(long)]
    pub no_reconcile: bool,
}

impl RunArgs {
    pub fn worker_count(&self) -> usize {
        self.workers
            .filter(|&n| n > 0)
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(1)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_ms)
    }
}
