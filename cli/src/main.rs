//! chainpoints: points-ledger indexer for one lending contract.
//!
//! # Commands
//! ```text
//! chainpoints run                      index and serve the HTTP query surface
//! chainpoints leaderboard [--limit N]  print the top participants
//! chainpoints status                   print the checkpoint
//! chainpoints check-endpoints          probe every configured RPC endpoint
//! ```
//!
//! Every command takes `--config <file.toml>`; see [`config`] for the
//! environment overrides.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;

use chainpoints_core::ledger::top_participants;
use chainpoints_evm::{IndexerBuilder, ManagedRpcClient};
use chainpoints_rpc::{ConnectionManager, ConnectionManagerConfig, HttpClientConfig, HttpTransportFactory};

mod config;
mod logging;
mod server;
mod store;

use config::AppConfig;

#[derive(Parser)]
#[command(
    name = "chainpoints",
    about = "Points-ledger indexer for a lending contract",
    long_about = "
Replays the contract's Borrow / Repay / Liquidate history, accrues points to
share holders at 100 points per second, and follows new blocks.

ENVIRONMENT VARIABLES:
  CHAINPOINTS__RPC__URLS                  Comma-separated RPC endpoint pool
  CHAINPOINTS__INDEXER__CONTRACT_ADDRESS  Tracked contract
  CHAINPOINTS__STORAGE__URL               sqlite:<path> or postgres://...
  RUST_LOG                                Overrides log.level
",
    version
)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backfill, follow the chain and serve the query endpoints
    Run,

    /// Print the leaderboard from the ledger store
    Leaderboard {
        /// Number of participants
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the stored checkpoint
    Status,

    /// Query the head block of every configured endpoint
    #[command(name = "check-endpoints")]
    CheckEndpoints,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    logging::init_tracing(&config.log);

    match cli.command {
        Commands::Run => run(config).await,
        Commands::Leaderboard { limit, json } => leaderboard(&config, limit, json).await,
        Commands::Status => status(&config).await,
        Commands::CheckEndpoints => check_endpoints(&config).await,
    }
}

fn connection_manager(config: &AppConfig) -> Result<Arc<ConnectionManager>> {
    let factory = HttpTransportFactory::new(HttpClientConfig {
        request_timeout: Duration::from_secs(config.rpc.request_timeout_secs),
    })?;
    let manager = ConnectionManager::new(
        config.rpc.urls.clone(),
        factory,
        ConnectionManagerConfig {
            health_check_interval: Duration::from_secs(config.rpc.health_check_interval_secs),
            ..Default::default()
        },
    )?;
    Ok(Arc::new(manager))
}

async fn run(config: AppConfig) -> Result<()> {
    let store = store::open(&config.storage.url).await?;
    let manager = connection_manager(&config)?;

    let mut index_loop = IndexerBuilder::from_config(config.indexer_config())
        .build(ManagedRpcClient::new(Arc::clone(&manager)), Arc::clone(&store))
        .context("invalid indexer configuration")?;

    let app = server::router(server::AppState::new(
        store,
        Arc::clone(&manager),
        index_loop.subscribe_state(),
    ));
    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;
    info!(bind = %config.server.bind, "query server listening");

    let health = manager.spawn_health_loop();
    let mut http = tokio::spawn(async move { axum::serve(listener, app).await });

    let outcome = tokio::select! {
        res = index_loop.run() => match res {
            Ok(()) => Ok(()),
            Err(e) => Err(anyhow!(e).context("indexing stopped; restart resumes from the checkpoint")),
        },
        res = &mut http => match res {
            Ok(Ok(())) => Err(anyhow!("query server exited")),
            Ok(Err(e)) => Err(anyhow!(e).context("query server failed")),
            Err(e) => Err(anyhow!(e).context("query server task failed")),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            Ok(())
        }
    };

    http.abort();
    health.abort();
    outcome
}

async fn leaderboard(config: &AppConfig, limit: usize, json: bool) -> Result<()> {
    let store = store::open(&config.storage.url).await?;
    let entries = top_participants(store.as_ref(), Some(limit)).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("no participants yet");
    }
    for (rank, e) in entries.iter().enumerate() {
        println!("{:>4}  {}  {:>24.4}", rank + 1, e.address, e.points);
    }
    Ok(())
}

async fn status(config: &AppConfig) -> Result<()> {
    let store = store::open(&config.storage.url).await?;
    match store.load().await? {
        None => println!("not started: no checkpoint in {}", config.storage.url),
        Some(cp) => {
            println!("position          {}", cp.position);
            println!("last block        {}", cp.last_block_indexed());
            println!("total shares      {}", cp.pool.total_shares);
            println!("last accrual      {}", cp.pool.last_update);
            println!("points per share  {}", cp.pool.points_per_share);
            println!("updated at        {}", cp.updated_at);
        }
    }
    Ok(())
}

async fn check_endpoints(config: &AppConfig) -> Result<()> {
    let manager = connection_manager(config)?;
    let report = manager.probe_endpoints().await;

    let mut healthy = 0;
    for (url, head) in &report {
        match head {
            Ok(block) => {
                healthy += 1;
                println!("✓ {url}  head {block}");
            }
            Err(e) => println!("✗ {url}  {e}"),
        }
    }
    if healthy == 0 {
        bail!("no reachable endpoint among {}", report.len());
    }
    Ok(())
}
