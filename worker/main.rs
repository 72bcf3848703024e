#![forbid(unsafe_code)]

//! `swe-agent-worker`: queue consumer binary.
//!
//! Polls the shared task queue and runs each session in a local sandbox
//! under the configured workspace root.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use swe_agent::config::GlobalConfig;
use swe_agent::control_plane::{ControlPlane, HttpControlPlane};
use swe_agent::llm::openai::OpenAiClient;
use swe_agent::orchestrator::{Worker, WorkerServices};
use swe_agent::persistence::db;
use swe_agent::persistence::queue::SqliteTaskQueue;
use swe_agent::persistence::state_store::SqliteStateStore;
use swe_agent::sandbox::{LocalSandboxFactory, SandboxRegistry};
use swe_agent::workflow::{NodeRegistry, WorkflowEngine};
use swe_agent::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "swe-agent-worker", about = "SWE agent session worker", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured workspace root.
    #[arg(long)]
    workspace: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("swe-agent worker bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(workspace) = args.workspace {
        config.worker.workspace_root = workspace;
    }
    config.load_credentials().await?;
    info!("configuration loaded");

    std::fs::create_dir_all(&config.worker.workspace_root)
        .map_err(|err| AppError::Config(format!("cannot create workspace root: {err}")))?;

    let db = Arc::new(db::connect(&config.db_path()).await?);
    info!("database connected");

    let control_plane: Option<Arc<dyn ControlPlane>> = match &config.worker.control_plane_url {
        Some(url) => Some(Arc::new(HttpControlPlane::new(url)?)),
        None => {
            info!("no control plane configured; credentials and pull requests are disabled");
            None
        }
    };

    let services = WorkerServices {
        store: Arc::new(SqliteStateStore::new(Arc::clone(&db))),
        queue: Arc::new(SqliteTaskQueue::new(Arc::clone(&db))),
        sandboxes: Arc::new(LocalSandboxFactory::new(config.worker.workspace_root.clone())),
        registry: Arc::new(SandboxRegistry::new()),
        llm: Arc::new(OpenAiClient::from_config(&config.llm)?),
        control_plane,
    };
    let engine = WorkflowEngine::new(NodeRegistry::standard(), config.engine);
    let worker = Worker::new(
        services,
        engine,
        config.engine,
        Duration::from_secs(config.worker.poll_timeout_seconds),
    );

    let ct = CancellationToken::new();
    let signal_ct = ct.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received, finishing current session");
        signal_ct.cancel();
    });

    worker.run(ct).await;
    info!("swe-agent worker shut down");
    Ok(())
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
