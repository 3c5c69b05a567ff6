//! TxElevator CLI.
//!
//! ```bash
//! txelevator run    --network testnet --workers 4
//! txelevator status --network mainnet
//! txelevator info
//! ```

use anyhow::{Context, Result};
use clap::Parser;

use txelevator_core::StoreReader;
use txelevator_observability::{init_tracing, LogConfig};
use txelevator_storage::SqliteStore;

mod config;
mod run;

use config::{Cli, Commands, NodeArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&LogConfig {
        json: cli.log_json,
        ..LogConfig::with_level(cli.log_level.as_str())
    });

    match cli.command {
        Commands::Run(args) => run::run(args).await,
        Commands::Status(node) => cmd_status(node).await,
        Commands::Info => {
            cmd_info();
            Ok(())
        }
    }
}

async fn cmd_status(node: NodeArgs) -> Result<()> {
    let settings = node.resolve();
    let store = SqliteStore::open_read_only(&settings.database_file)
        .await
        .with_context(|| format!("opening {}", settings.database_file))?;
    let stats = store.stats().await?;
    let tip = store.tip_block_header().await?;

    println!("TxElevator status ({})", settings.network);
    println!("  Database:        {}", settings.database_file);
    match tip {
        Some(tip) => println!("  Tip block:       #{} {}", tip.block_number, tip.block_hash),
        None => println!("  Tip block:       none"),
    }
    println!("  Avg block time:  {:.2}s", stats.average_block_time);
    println!("  Pending:         {}", stats.pending_count);
    println!("  Proposing:       {}", stats.proposing_count);
    println!("  Proposed:        {}", stats.proposed_count);
    println!("  Committed:       {}", stats.committed_count);
    println!("  Rejected:        {}", stats.rejected_count);
    Ok(())
}

fn cmd_info() {
    println!("TxElevator v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default network: testnet");
    println!("  Testnet feed:    {}", config::DEFAULT_TESTNET_WS);
    println!("  Mainnet feed:    {}", config::DEFAULT_MAINNET_WS);
    println!("  HTTP API port:   3000 (API_HTTP_PORT)");
    println!("  WebSocket port:  3001 (API_WS_PORT)");
    println!("  Detector poll:   1s, liveness check 5s");
    println!("  Storage:         SQLite (WAL), one writer, read-only worker handles");
    println!("  Topics:          newSnapshot, newBlock");
}
