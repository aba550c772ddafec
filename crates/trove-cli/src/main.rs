//! Trove CLI - maintenance commands for a trove history store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use trove_domain::traits::{RemovalObserver, StoreExecutor};
use trove_domain::RemovalEvent;
use trove_expiration::{ExpirationConfig, ExpirationService, LogMetrics};
use trove_store::SqliteStore;

#[derive(Parser)]
#[command(name = "trove", version, about = "History store maintenance")]
struct Cli {
    /// Path to the store database.
    #[arg(long, global = true, default_value = "trove.db", env = "TROVE_DB")]
    db: PathBuf,

    /// Retention capacity override; -1 derives one from the size budget.
    #[arg(long, global = true, default_value_t = -1)]
    max_records: i64,

    /// Enable interaction cleanup.
    #[arg(long, global = true)]
    interactions: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one expiration pass and print what was removed.
    Expire {
        /// Per-operation row limit; -1 removes everything eligible.
        #[arg(long, default_value_t = -1)]
        limit: i64,
    },
    /// Print store statistics.
    Stats {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Run the background expiration service until interrupted.
    Serve,
}

struct PrintObserver;

impl RemovalObserver for PrintObserver {
    fn on_removals(&self, events: &[RemovalEvent]) {
        for event in events {
            let kind = if event.whole_record { "record" } else { "visits" };
            println!("expired {kind}: {}", event.url);
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let store = SqliteStore::new(&cli.db)
        .with_context(|| format!("opening store at {}", cli.db.display()))?;
    let config = ExpirationConfig {
        max_records: cli.max_records,
        interactions_enabled: cli.interactions,
        ..Default::default()
    };

    match cli.command {
        Command::Expire { limit } => {
            let service = ExpirationService::start(
                store,
                config,
                vec![Arc::new(PrintObserver) as Arc<dyn RemovalObserver>],
                Arc::new(LogMetrics),
            );
            let events = service.debug_expire(limit).await?;
            println!("{events} entries affected");
            service.shutdown().await;
        }
        Command::Stats { json } => {
            let stats = store.stats()?;
            let visits = store.visit_count()?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "records": stats.record_count,
                        "visits": visits,
                        "allocated_bytes": stats.allocated_bytes,
                        "free_bytes": stats.free_bytes,
                    })
                );
            } else {
                println!("records:         {}", stats.record_count);
                println!("visits:          {visits}");
                println!("allocated bytes: {}", stats.allocated_bytes);
                println!("free bytes:      {}", stats.free_bytes);
            }
        }
        Command::Serve => {
            let service = ExpirationService::start(
                store,
                config,
                vec![Arc::new(PrintObserver) as Arc<dyn RemovalObserver>],
                Arc::new(LogMetrics),
            );
            info!("expiration service running, press ctrl-c to stop");
            tokio::signal::ctrl_c().await?;
            service.shutdown().await;
        }
    }

    Ok(())
}
