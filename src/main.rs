//! Command-line entry point.
//!
//! 1. Load configuration, then initialise tracing at the configured level.
//! 2. `history <account>` prints the merged transaction history, one JSON object per line.
//! 3. `watch <account> --pool <key>` keeps the pool's balances live and logs every
//!    update until Ctrl-C.

use clap::{Parser, Subcommand};
use ethers::types::Address;
use eyre::{eyre, Result, WrapErr};
use std::{path::PathBuf, sync::Arc};
use tokio::{select, signal};
use tracing::{info, warn};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use activity_sync::{
    config::Config,
    decimals::format_currency,
    history::{HistoryAggregator, HistoryFetch},
    indexer::{GraphQlIndexerClient, IndexerClient},
    sync::AccountSync,
};

/// Log targets emitted by the library.
const LOG_TARGETS: [&str; 7] = [
    "history",
    "indexer",
    "pool_read_model",
    "invalidator",
    "scenario",
    "session",
    "activity_sync",
];

#[derive(Parser, Debug)]
#[command(name = "activity-sync", version, about = "Account activity history and staking pool balances")]
struct Cli {
    /// Directory holding main.json, pools.json and optionally gas_limits.json.
    #[arg(long, default_value = "config")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the account's merged transaction history.
    History { account: String },
    /// Follow the account's balances in one staking pool.
    Watch {
        account: String,
        #[arg(long)]
        pool: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_from_directory(&cli.config).await?;
    init_tracing(&config.log_level)?;
    info!("Configuration loaded from {}", cli.config.display());

    match cli.command {
        Command::History { account } => run_history(&config, parse_account(&account)?).await,
        Command::Watch { account, pool } => run_watch(&config, parse_account(&account)?, &pool).await,
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let mut filter = EnvFilter::from_default_env()
        .add_directive("ethers_providers=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);
    for target in LOG_TARGETS {
        filter = filter.add_directive(
            format!("{}={}", target, level)
                .parse()
                .wrap_err_with(|| format!("Invalid log level: {}", level))?,
        );
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
    Ok(())
}

fn parse_account(raw: &str) -> Result<Address> {
    raw.parse::<Address>()
        .map_err(|e| eyre!("Invalid account address {:?}: {}", raw, e))
}

async fn run_history(config: &Config, account: Address) -> Result<()> {
    let indexer: Arc<dyn IndexerClient> = Arc::new(GraphQlIndexerClient::new(
        config.indexer.endpoints.clone(),
        config.indexer.timeout(),
    )?);
    let aggregator = HistoryAggregator::new(indexer, config.indexer.exchange_window);

    match aggregator.fetch_history(account).await {
        HistoryFetch::Committed { events } => {
            for event in aggregator.state().events.iter() {
                println!("{}", serde_json::to_string(event)?);
            }
            info!(events, "History printed");
            Ok(())
        }
        HistoryFetch::Failed(message) => Err(eyre!("History fetch failed: {}", message)),
        other => Err(eyre!("History fetch did not complete: {:?}", other)),
    }
}

async fn run_watch(config: &Config, account: Address, pool_key: &str) -> Result<()> {
    let descriptor = config.get_pool(pool_key)?.clone();
    let sync = AccountSync::connect(config).await?;
    let session = sync.pool(pool_key)?.clone();
    let mut snapshots = session.read_model().subscribe();

    info!(pool = pool_key, explorer = %descriptor.explorer_url(), "Watching pool");
    let report = sync.set_account(Some(account)).await;
    if let Some(HistoryFetch::Failed(message)) = &report.history {
        warn!(error = %message, "History unavailable");
    }

    loop {
        select! {
            _ = signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if let Some(snapshot) = snapshot {
                    let b = &snapshot.balances;
                    info!(
                        held = %format!("{} {}", format_currency(b.held_amount), descriptor.staking_symbol),
                        staked = %format!("{} {}", format_currency(b.staked_amount), descriptor.staking_symbol),
                        reward = %format!("{} {}", format_currency(b.reward_amount), descriptor.reward_symbol),
                        actions = ?session.enabled_actions(),
                        "Pool balances"
                    );
                }
            }
        }
    }

    sync.dispose();
    Ok(())
}
