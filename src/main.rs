#![forbid(unsafe_code)]

//! `bot-supervisor`: worker supervisor binary.
//!
//! Bootstraps configuration, the HTTP control plane, the IPC server for
//! `bot-supervisor-ctl`, and the worker exit monitor.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use bot_supervisor::config::GlobalConfig;
use bot_supervisor::supervisor::monitor::spawn_exit_monitor;
use bot_supervisor::{http, ipc, AppError, Result, Supervisor};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "bot-supervisor", about = "Bot worker process supervisor", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the worker executable from the configuration.
    #[arg(long)]
    worker: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("bot-supervisor bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(worker) = args.worker {
        config.worker_executable = worker;
        config.validate()?;
    }
    let config = Arc::new(config);
    info!(
        worker = %config.worker_executable.display(),
        "configuration loaded"
    );

    let supervisor = Supervisor::with_defaults(Arc::clone(&config));
    let ct = CancellationToken::new();

    // ── Start background services ───────────────────────
    let monitor_handle = spawn_exit_monitor(
        supervisor.clone(),
        config.timeouts.monitor_interval(),
        ct.clone(),
    );

    let ipc_handle = match ipc::spawn_ipc_server(supervisor.clone(), ct.clone()) {
        Ok(handle) => Some(handle),
        Err(err) => {
            error!(%err, "ipc server unavailable; continuing without local control");
            None
        }
    };

    let http_ct = ct.clone();
    let http_supervisor = supervisor.clone();
    let http_handle = tokio::spawn(async move {
        if let Err(err) = http::serve_http(http_supervisor, http_ct.clone()).await {
            error!(%err, "http control plane failed");
            http_ct.cancel();
        }
    });

    info!("bot-supervisor ready");

    // ── Wait for shutdown ───────────────────────────────
    tokio::select! {
        () = shutdown_signal() => info!("shutdown signal received"),
        () = ct.cancelled() => info!("shutting down after service failure"),
    }
    ct.cancel();

    supervisor.shutdown_all().await;

    let _ = tokio::join!(http_handle, monitor_handle);
    if let Some(handle) = ipc_handle {
        let _ = handle.await;
    }
    info!("bot-supervisor shut down");

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
