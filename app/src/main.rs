//! Process entry point (§9 "Globals → process services"): loads settings,
//! constructs the Market Feeder, Manager, and config store as explicit
//! `Arc`-held services, then runs the HTTP/WebSocket surface until the
//! process receives a shutdown signal.

mod tracing_layer;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use database::{ConfigStore, Db, InMemoryConfigStore, PgConfigStore};
use engine::Manager;
use events::WsMessage;
use market_feeder::MarketFeeder;

use crate::tracing_layer::WsBroadcastLayer;

const BROADCAST_CAPACITY: usize = 1024;
const WS_CACHE_SIZE: usize = 200;

#[derive(Parser, Debug)]
#[command(author, version, about = "AI trading supervisor control plane")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the control plane: market feeder, trader manager, HTTP/WS server.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = app_config::load_settings().context("failed to load application settings")?;

    let (ws_tx, _) = broadcast::channel::<WsMessage>(BROADCAST_CAPACITY);
    let log_cache = Arc::new(Mutex::new(VecDeque::with_capacity(WS_CACHE_SIZE)));

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(settings.app.log_level.clone()))
        .with(tracing_subscriber::fmt::layer())
        .with(WsBroadcastLayer::new(ws_tx.clone(), log_cache))
        .init();

    let cli = Cli::parse();
    tracing::info!(environment = %settings.app.environment, "starting AI trading supervisor");

    match cli.command {
        Commands::Serve => run_serve(settings, ws_tx).await?,
    }

    Ok(())
}

/// Wires the process services together and runs until `ctrl_c`.
async fn run_serve(settings: app_config::Settings, ws_tx: broadcast::Sender<WsMessage>) -> Result<()> {
    let db = Db::connect(&settings.database.url)
        .await
        .context("failed to connect to the decision-log database")?;

    let store: Arc<dyn ConfigStore> = if settings.app.environment == "test" {
        Arc::new(InMemoryConfigStore::new())
    } else {
        Arc::new(PgConfigStore::new(db.pool().clone()))
    };

    let feeder = Arc::new(MarketFeeder::new(
        settings.market_data.rest_base_url.clone(),
        settings.market_data.ws_base_url.clone(),
    ));
    feeder.spawn_background_tasks();

    let manager = Arc::new(Manager::new(store, feeder, db.clone(), ws_tx.clone(), settings.clone()));
    manager
        .load_from_store(None)
        .await
        .context("failed to load trader configs from the store")?;

    let shutdown_manager = manager.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received, stopping traders and market feeder");
        shutdown_manager.shutdown().await;
        std::process::exit(0);
    });

    web_server::run(settings.server, manager, db, ws_tx)
        .await
        .context("web server exited with an error")
}
