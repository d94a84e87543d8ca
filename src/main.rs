#![forbid(unsafe_code)]

//! `agent-beacon` — hosts one discoverable agent session.
//!
//! Publishes the session descriptor with a heartbeat, serves the attach
//! handshake on the session socket, and withdraws both on shutdown.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use agent_beacon::config::GlobalConfig;
use agent_beacon::session::SessionHost;
use agent_beacon::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-beacon", about = "Discoverable agent session host", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Fixed session id instead of a random UUID.
    #[arg(long)]
    session_id: Option<String>,

    /// Override the configured display name.
    #[arg(long)]
    name: Option<String>,

    /// Override the registry directory.
    #[arg(long)]
    registry_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-beacon bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_or_default(args.config.as_deref())?;
    if let Some(name) = args.name {
        config.display_name = name;
    }
    if let Some(dir) = args.registry_dir {
        config.registry_dir = Some(dir);
    }
    info!(
        registry = %config.registry_dir().display(),
        sockets = %config.socket_dir().display(),
        "configuration loaded"
    );

    // ── Start session ───────────────────────────────────
    let mut host = SessionHost::start_from_config(&config, args.session_id).await?;
    info!(
        session_id = %host.session_id(),
        socket = %host.socket_path().display(),
        "session ready"
    );

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    host.stop().await;
    info!("agent-beacon shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
