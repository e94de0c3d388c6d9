//! Headless entrypoint for the Shannon agent daemon.
//!
//! Parses arguments, sets up a rolling log file, loads config, wires every
//! subsystem via [`shannon_core::ShannonBuilder`], and runs until a shutdown
//! signal arrives — mirroring the teacher's `plugins/logging.rs` (rolling
//! file + `RUST_LOG` filter) and `gateway/daemon.rs` (bind, log, serve until
//! signalled) shapes, collapsed into a single in-process daemon rather than
//! a desktop app plus a separate gateway process.

use std::path::PathBuf;
use std::sync::OnceLock;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use shannon_core::config::{default_config_path, load_config};
use shannon_core::{DataDir, ShannonBuilder};

#[derive(Parser, Debug)]
#[command(name = "shannon", about = "Shannon conversational agent daemon", version)]
struct Cli {
    /// Path to `config.toml`. Defaults to the platform config directory, or
    /// `SHANNON_CONFIG` when set.
    #[arg(long)]
    config: Option<PathBuf>,
}

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Initializes a rolling daily log file under `<data_dir>/logs/` alongside
/// stdout, filtered by `RUST_LOG` (default `info`).
fn init_tracing(log_dir: &std::path::Path) {
    let file_appender = tracing_appender::rolling::daily(log_dir, "shannon.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()
        .ok();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = load_config(&config_path).map_err(anyhow::Error::msg)?;

    let data_dir = DataDir::resolve(&config)?;
    data_dir.ensure_exists()?;
    init_tracing(&data_dir.log_dir());

    info!(version = env!("CARGO_PKG_VERSION"), config = %config_path.display(), "Shannon starting");

    let shannon = ShannonBuilder::new(config).build().await?;
    shannon.start().await?;

    wait_for_shutdown_signal().await;

    info!("shutdown signal received, stopping subsystems");
    if let Err(e) = shannon.shutdown().await {
        error!(error = %e, "error during shutdown");
    }

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
