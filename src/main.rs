//! Hexrelay CLI - relay TCP/TLS connections and hex dump what flows through them

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use hexrelay_server::ProxyServer;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::cli::{version_string, Cli};

/// Setup logging; logs go to stderr so stdout only carries hex dumps
fn setup_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.wants_version() {
        println!("{}", version_string());
        return Ok(());
    }

    setup_logging(&cli.log_level);

    let config = cli.build_config().await.context("Invalid configuration")?;
    let server = ProxyServer::bind(config, cli.capture_sink()).await?;

    let listen_addr = server.local_addr()?;
    let target_addr = server.config().target_addr;
    println!("Proxying from {} to {}", listen_addr, target_addr);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    tokio::select! {
        _ = &mut ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        result = server.run() => {
            if let Err(e) = result {
                error!("Proxy stopped: {}", e);
                return Err(e.into());
            }
        }
    }

    info!("Hexrelay stopped");
    Ok(())
}
