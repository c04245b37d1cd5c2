//! ingestd - DirectAdmin email log ingester
//!
//! Polls the DirectAdmin email log API on an interval, stores the results in
//! SQLite and serves a status report on a secret path.

use anyhow::{Context, Result};
use clap::Parser;
use ingest::{IngestConfig, Ingester, SqliteStore};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;

mod scheduler;
mod server;

use server::InspectState;

#[derive(Parser)]
#[command(name = "ingestd")]
#[command(about = "DirectAdmin email log ingester")]
#[command(version)]
struct Cli {
    /// Path to a JSON config file (default: ~/.config/directadmin-ingest/ingest.json, then env)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a single sync and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let settings = IngestConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    info!("Using database at {}", settings.database_path.display());

    if let Some(parent) = settings.database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory: {}", parent.display()))?;
    }
    let store = Arc::new(SqliteStore::new(&settings.database_path)?);
    let alerter = settings.alerter();
    let ingester = Arc::new(Ingester::new(
        Arc::new(settings.directadmin_client()),
        store.clone(),
        store.clone(),
        alerter.clone(),
        settings.sync_options()?,
    ));

    if cli.once {
        let ok = scheduler::run_once(ingester).await.is_some();
        anyhow::ensure!(ok, "Sync failed");
        return Ok(());
    }

    let inspect = InspectState {
        records: store.clone(),
        state: store,
        magic_path: Arc::from(settings.magic_path.as_str()),
    };

    let result = tokio::select! {
        result = server::serve(settings.listen_addr, inspect) => result,
        _ = scheduler::run_forever(ingester, settings.tick_interval) => Ok(()),
        signal = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            signal.context("Failed to listen for shutdown signal")
        }
    };

    // Join alerts still in flight from an interrupted run
    tokio::task::spawn_blocking(move || alerter.flush())
        .await
        .context("Failed to flush alerts")?;

    result
}
