//! fleetscaled: the fleet autoscaler daemon.
//!
//! Single binary that assembles:
//! - State store (redb)
//! - Sync loop (buffer and webhook policies)
//! - Admission webhook + REST API
//!
//! # Usage
//!
//! ```text
//! fleetscaled run --config /etc/fleetscale.toml --port 8443
//! fleetscaled validate autoscaler.json
//! ```

mod config;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fleetscale_admission::AdmissionValidator;
use fleetscale_autoscale::{HttpWebhookCaller, SyncController, SyncLoop, TracingNotifier};
use fleetscale_state::StateStore;

use crate::config::{DaemonConfig, LogFormat};

const DEFAULT_FILTER: &str = "info,fleetscale=debug";

#[derive(Parser)]
#[command(name = "fleetscaled", about = "Fleet autoscaler daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the sync loop and the admission/API server.
    Run {
        /// Path to fleetscale.toml. Defaults apply when absent.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides the config file).
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for persistent state (overrides the config file).
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Run admission checks on a FleetAutoscaler JSON file and exit.
    Validate {
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            port,
            data_dir,
        } => {
            let mut config = DaemonConfig::load(config.as_deref())?;
            if let Some(port) = port {
                config.listen_port = port;
            }
            if let Some(dir) = data_dir {
                config.data_dir = dir;
            }
            init_tracing(config.log_format);
            run(config).await
        }
        Command::Validate { file } => {
            init_tracing(LogFormat::Text);
            validate_file(&file)
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    info!("fleetscale daemon starting");

    let sync_interval = config.sync_interval()?;
    let webhook_timeout = config.webhook_timeout()?;

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating {}", config.data_dir.display()))?;
    let db_path = config.data_dir.join("fleetscale.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let controller = Arc::new(SyncController::new(
        Arc::new(store.clone()),
        Arc::new(TracingNotifier),
        Arc::new(HttpWebhookCaller::new(webhook_timeout)),
    ));
    let sync_loop = SyncLoop::new(controller, sync_interval, config.max_concurrent_syncs);
    info!(
        interval = ?sync_interval,
        webhook_timeout = ?webhook_timeout,
        "sync controller initialized"
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sync_handle = tokio::spawn(async move {
        sync_loop.run(shutdown_rx).await;
    });

    // ── Start API server ───────────────────────────────────────

    let router = fleetscale_admission::build_router(store);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.listen_port));
    info!(%addr, "admission/API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for ctrl-c");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = sync_handle.await;

    info!("fleetscale daemon stopped");
    Ok(())
}

fn validate_file(path: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let verdict = AdmissionValidator::new().validate(&raw);
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    if !verdict.allowed {
        anyhow::bail!("{} rejected: {}", path.display(), verdict.message());
    }
    Ok(())
}
