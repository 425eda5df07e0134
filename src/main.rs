use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use clap::Parser;
use config::Config;
use ledger::Ledger;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod ledger;
mod protocol;
mod server;
mod session;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // connect tracing to stdout, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::parse();

    let ledger = Ledger::open(&config.ledger)
        .await
        .context("failed to load the ledger")?;
    if ledger.is_empty() {
        tracing::warn!("the ledger has no accounts, every login will be refused");
    }
    tracing::info!(
        "loaded {} accounts from {}",
        ledger.len(),
        ledger.path().display()
    );

    let addr = SocketAddr::new(config.bind, config.port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("server is listening on: {}", listener.local_addr()?);

    server::serve(listener, Arc::new(ledger), config.max_sessions).await;

    Ok(())
}
