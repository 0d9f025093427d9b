//! postq Server - Message Broker HTTP Server
//!
//! This is the main entry point for the postq message broker.

mod api;
mod config;
mod logging;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use postq_core::Broker;
use tracing::{error, info};

use crate::api::AppState;
use crate::config::{Cli, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::resolve(&cli)?;

    logging::init_logging(&config.log);

    let broker = Arc::new(Broker::new());
    let state = AppState::new(broker, config.queue.max_wait());
    let app = api::create_router(state);

    let addr = config.server.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!("postq server listening on {}", addr);
    if let Some(max_wait) = config.queue.max_wait() {
        info!(max_wait_secs = max_wait.as_secs(), "Consumer wait is capped");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("postq server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
