//! WorkTrack - time tracking interval engine daemon
//!
//! Loads configuration, opens the database and runs the scheduler sweep
//! until Ctrl-C.

use anyhow::Context;
use worktrack_app::{init_tracing, AppContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env must be loaded before the config reads the environment
    let dotenv = dotenvy::dotenv();

    let config = worktrack_infra::config::load().context("failed to load configuration")?;
    init_tracing(&config.logging);

    match dotenv {
        Ok(path) => tracing::info!(path = %path.display(), "loaded .env"),
        Err(err) => tracing::debug!(error = %err, "no .env file loaded"),
    }

    let mut ctx = AppContext::new(config).await.context("failed to initialise application")?;
    ctx.start().await.context("failed to start background jobs")?;
    tracing::info!("WorkTrack running; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown requested");
    ctx.shutdown().await;
    Ok(())
}
