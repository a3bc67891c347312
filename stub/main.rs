#![forbid(unsafe_code)]

//! `bot-worker-stub`: reference worker for exercising the supervisor.
//!
//! Connects to the reply channel named by `BOT_CHANNEL` and behaves
//! according to `STUB_MODE`:
//!
//! - `ready` (default): announce readiness, then keep polling the supervisor
//!   with `{"poll": n}` requests. Every reply is appended as one line to the
//!   file named by `STUB_RECORD`, when set.
//! - `silent`: connect and never say anything.
//! - `wrong-first`: send something other than the readiness token first.
//! - `exit`: exit immediately with a non-zero code.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use bot_supervisor::channel::client::RequestClient;
use bot_supervisor::process::spawner::CHANNEL_ENV;
use bot_supervisor::{AppError, Result};

/// Exit code used by the `exit` mode.
const EARLY_EXIT_CODE: i32 = 3;

fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?;

    let mode = std::env::var("STUB_MODE").unwrap_or_else(|_| "ready".into());
    if mode == "exit" {
        warn!("exit mode: leaving before the handshake");
        std::process::exit(EARLY_EXIT_CODE);
    }

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(&mode))
}

async fn run(mode: &str) -> Result<()> {
    let address = std::env::var(CHANNEL_ENV)
        .map_err(|_| AppError::Config(format!("{CHANNEL_ENV} is not set")))?;
    let record = std::env::var_os("STUB_RECORD").map(PathBuf::from);

    let mut client = RequestClient::connect(&address).await?;
    info!(%address, mode, args = ?std::env::args().skip(1).collect::<Vec<_>>(), "stub connected");

    match mode {
        "silent" => idle().await,
        "wrong-first" => {
            client.send(Bytes::from_static(b"hello")).await?;
            idle().await
        }
        _ => serve(client, record).await,
    }
}

async fn serve(mut client: RequestClient, record: Option<PathBuf>) -> Result<()> {
    client.announce_ready().await?;
    info!("readiness acknowledged");

    let mut poll: u64 = 0;
    loop {
        let request = serde_json::json!({ "poll": poll }).to_string();
        let reply = match client.request(Bytes::from(request)).await {
            Ok(reply) => reply,
            Err(err) => {
                info!(%err, "channel closed; exiting");
                return Ok(());
            }
        };
        poll += 1;

        let text = String::from_utf8_lossy(&reply).into_owned();
        info!(reply = %text, "reply received");
        if let Some(ref path) = record {
            append_line(path, &text).await?;
        }
    }
}

async fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(format!("{line}\n").as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

async fn idle() -> Result<()> {
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
