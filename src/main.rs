#![forbid(unsafe_code)]

//! `swe-agent`: session API server binary.
//!
//! Bootstraps configuration and the database, starts the retention task
//! and serves the session lifecycle API until a shutdown signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use swe_agent::api;
use swe_agent::config::GlobalConfig;
use swe_agent::orchestrator::SessionService;
use swe_agent::persistence::queue::SqliteTaskQueue;
use swe_agent::persistence::state_store::{SqliteStateStore, StateStore};
use swe_agent::persistence::{db, retention};
use swe_agent::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "swe-agent", about = "SWE agent session API server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured HTTP port.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("swe-agent server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(port) = args.port {
        config.server.http_port = port;
    }
    info!("configuration loaded");

    // ── Initialize database ─────────────────────────────
    let db = Arc::new(db::connect(&config.db_path()).await?);
    info!("database connected");

    // ── Start retention service ──────────────────────────
    let ct = CancellationToken::new();
    let retention_handle =
        retention::spawn_retention_task(Arc::clone(&db), config.retention_days, ct.clone());
    info!("retention service started");

    let store = Arc::new(SqliteStateStore::new(Arc::clone(&db)));
    report_running_sessions(store.as_ref()).await;
    let queue = Arc::new(SqliteTaskQueue::new(Arc::clone(&db)));
    let service = Arc::new(SessionService::new(store, queue));

    // ── Start HTTP API ──────────────────────────────────
    let bind = format!("{}:{}", config.server.bind, config.server.http_port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind HTTP API on {bind}: {err}")))?;

    let api_ct = ct.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(err) = api::serve(listener, service, api_ct).await {
            error!(%err, "HTTP API failed");
        }
    });

    info!("swe-agent server ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    let _ = tokio::join!(api_handle, retention_handle);
    info!("swe-agent shut down");

    Ok(())
}

/// Log sessions a previous worker left `RUNNING`.
async fn report_running_sessions(store: &dyn StateStore) {
    match store.list_stale_running().await {
        Ok(ids) if ids.is_empty() => {}
        Ok(ids) => warn!(count = ids.len(), sessions = ?ids, "sessions marked RUNNING at startup"),
        Err(err) => warn!(%err, "could not list running sessions"),
    }
}

/// Wait for SIGTERM or ctrl-c.
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
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
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
