//! lrukv - An In-Memory LRU Cache Server
//!
//! Entry point: parses options, sets up logging, builds the runtime and runs
//! the server until Ctrl+C or SIGTERM.

use anyhow::Context;
use clap::Parser;
use lrukv::{Server, ServerConfig};
use std::net::SocketAddr;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();

    // RUST_LOG overrides the default level
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
        .context("failed to build the Tokio runtime")?;

    runtime.block_on(serve(config))
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let server = Server::bind(&config)
        .await
        .with_context(|| format!("failed to start server on {}", config.bind_address()))?;

    print_banner(&config, server.local_addr()?);

    server.run(shutdown_signal()).await?;
    Ok(())
}

/// Completes on Ctrl+C, or on SIGTERM where signals exist.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

fn print_banner(config: &ServerConfig, addr: SocketAddr) {
    println!(
        r#"
   ██╗     ██████╗ ██╗   ██╗██╗  ██╗██╗   ██╗
   ██║     ██╔══██╗██║   ██║██║ ██╔╝██║   ██║
   ██║     ██████╔╝██║   ██║█████╔╝ ██║   ██║
   ██║     ██╔══██╗██║   ██║██╔═██╗ ╚██╗ ██╔╝
   ███████╗██║  ██║╚██████╔╝██║  ██╗ ╚████╔╝
   ╚══════╝╚═╝  ╚═╝ ╚═════╝ ╚═╝  ╚═╝  ╚═══╝

lrukv v{} - In-Memory LRU Cache Server
──────────────────────────────────────────────────────────────
Server started on {}
Capacity: {} keys, {} workers
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        lrukv::VERSION,
        addr,
        config.effective_capacity(),
        config.worker_threads()
    );
}
