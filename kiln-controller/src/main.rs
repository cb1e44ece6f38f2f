//! Kiln Controller
//!
//! Turns declarative build requests into execution plans and keeps the set
//! of finished runs bounded.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Store: In-memory object store, optionally seeded from JSON manifests
//! - Reconcilers: run, count-limit retention and TTL retention
//! - Scheduler: Watches, work queues and worker pools driving the reconcilers
//!
//! The manager runs until interrupted with Ctrl-C.

mod config;
mod error;
mod manifests;
mod reconciler;
mod scheduler;

use anyhow::{Context, Result};
use clap::Parser;
use kiln_store::{InMemoryStore, ObjectStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "kiln-controller")]
#[command(about = "Build controller manager", long_about = None)]
struct Args {
    /// Directory of JSON resource files to seed the store with
    #[arg(long, env = "KILN_MANIFESTS")]
    manifests: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kiln_controller=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting Kiln controller manager");

    let config = load_config()?;
    info!(
        "Loaded configuration: service_account={}, ctx_timeout={:?}",
        config.service_account_name, config.ctx_timeout
    );

    let store: Arc<dyn ObjectStore> = Arc::new(InMemoryStore::new());
    if let Some(dir) = &args.manifests {
        manifests::load_dir(store.as_ref(), dir)
            .await
            .context("Failed to seed the object store")?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    scheduler::run(&config, store, reconciler::CONTROLLERS, shutdown_rx).await;

    info!("Controller manager stopped");
    Ok(())
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    match Config::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(e) => {
            warn!("Failed to load config from environment, using defaults: {}", e);
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}
