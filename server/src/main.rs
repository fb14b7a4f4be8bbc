//! Clockchain server entry point
//!
//! Opens the graph store, starts the growth loops that are enabled, and
//! serves the tool surface over stdio until the client disconnects.

use anyhow::Context;
use clap::Parser;
use clockchain_server::mcp::McpServer;
use clockchain_server::{Backend, Settings};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::parse();

    // Stdout is the protocol channel; logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting Clockchain server");
    tracing::info!("Data directory: {:?}", settings.data_dir);

    let backend = Backend::from_settings(&settings).context("failed to initialise backend")?;
    let loops = backend.start_loops(&settings.expansion(), &settings.daily());

    let mut server = McpServer::new(Arc::new(backend));
    let served = server.run().await;

    for handle in loops {
        handle.abort();
    }
    served.context("JSON-RPC server error")?;

    tracing::info!("Clockchain server stopped");
    Ok(())
}
