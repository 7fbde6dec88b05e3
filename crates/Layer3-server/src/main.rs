//! desk - local desktop-emulation backend

use anyhow::Context;
use clap::Parser;
use desk_foundation::DeskConfig;
use desk_server::{build_router, AppState};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often finished-but-unpolled jobs are swept
const REAP_INTERVAL_SECS: u64 = 30;

/// desk - serves the desktop front end, runs whitelisted commands and scripts
#[derive(Parser, Debug)]
#[command(name = "desk")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Confinement root (overrides ROOT_DIR)
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = DeskConfig::from_env().context("Failed to read configuration")?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(root) = args.root {
        config.root_dir = root;
    }

    // Initialize logging
    let log_level = if args.debug {
        "debug".to_string()
    } else {
        config.log_level.clone()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let addr = config.bind_addr();
    let state = AppState::from_config(config).context("Failed to initialize services")?;
    info!(
        "Root {} | whitelist: {} | scripts: {}",
        state.guard.root().display(),
        state.jobs.policy().whitelist().join(","),
        state.jobs.scripts_dir().display()
    );

    let jobs = state.jobs.clone();
    let reaper = jobs
        .clone()
        .start_periodic_reap(Duration::from_secs(REAP_INTERVAL_SECS));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("desk listening on http://{}", addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    reaper.abort();
    jobs.registry().sync_snapshot();
    info!("desk stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
