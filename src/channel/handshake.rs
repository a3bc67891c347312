//! Worker readiness handshake.
//!
//! A freshly spawned worker connects to its bound reply channel and sends
//! [`READY_TOKEN`] as its very first request once its own initialization is
//! done. The supervisor answers with [`READY_ACK`], which leaves the endpoint
//! back in `AwaitingRequest` so the first application exchange starts from a
//! clean alternation state.
//!
//! Any other first frame violates the protocol and is reported as
//! `AppError::UnexpectedFirstMessage`; it is never handed to the application.
//! The accept and the first receive together are bounded by one deadline.

use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::endpoint::ReplyEndpoint;
use super::transport::Binding;
use crate::{AppError, Result};

/// Sentinel a worker sends once it is initialized.
pub const READY_TOKEN: &[u8] = b"ready";

/// Reply the supervisor sends to acknowledge [`READY_TOKEN`].
pub const READY_ACK: &[u8] = b"ok";

/// How often the worker process is probed while the handshake is pending.
const PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// Longest prefix of an unexpected first frame quoted in errors.
const PREVIEW_BYTES: usize = 64;

/// Accept the worker's connection and complete the readiness exchange.
///
/// `exited` is polled every [`PROBE_INTERVAL`]; returning `Some(status)`
/// aborts the handshake early because a dead worker can never become ready.
///
/// # Errors
///
/// - `AppError::StartupTimeout`: no readiness token within `timeout`.
/// - `AppError::UnexpectedFirstMessage`: the first frame was something else.
/// - `AppError::NotRunning`: the worker exited during the handshake.
/// - `AppError::Cancelled`: `cancel` fired (stop or shutdown).
/// - `AppError::Bind` / `Recv` / `Send`: transport failures.
pub async fn complete_handshake(
    binding: &mut dyn Binding,
    timeout: Duration,
    cancel: &CancellationToken,
    mut exited: impl FnMut() -> Option<String> + Send,
) -> Result<ReplyEndpoint> {
    let deadline = tokio::time::Instant::now() + timeout;
    let exchange = exchange_ready(binding);
    tokio::pin!(exchange);

    let mut probe = tokio::time::interval(PROBE_INTERVAL);
    probe.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                return Err(AppError::Cancelled("start cancelled during readiness handshake".into()));
            }
            result = &mut exchange => return result,
            () = tokio::time::sleep_until(deadline) => {
                return Err(AppError::StartupTimeout(format!(
                    "readiness token not received within {timeout:?}"
                )));
            }
            _ = probe.tick() => {
                if let Some(status) = exited() {
                    return Err(AppError::NotRunning(format!(
                        "worker {status} before completing the readiness handshake"
                    )));
                }
            }
        }
    }
}

async fn exchange_ready(binding: &mut dyn Binding) -> Result<ReplyEndpoint> {
    let io = binding.accept().await?;
    let mut endpoint = ReplyEndpoint::new(io);

    let first = endpoint.receive().await?;
    if first.as_ref() != READY_TOKEN {
        return Err(AppError::UnexpectedFirstMessage(format!(
            "expected readiness token, got {:?}",
            preview(&first)
        )));
    }
    debug!("handshake: readiness token received");

    endpoint.send(Bytes::from_static(READY_ACK)).await?;
    info!("handshake: worker ready");
    Ok(endpoint)
}

/// Lossy UTF-8 rendering of at most [`PREVIEW_BYTES`] of `frame`.
fn preview(frame: &[u8]) -> String {
    let cut = frame.len().min(PREVIEW_BYTES);
    let mut text = String::from_utf8_lossy(&frame[..cut]).into_owned();
    if frame.len() > cut {
        text.push('…');
    }
    text
}
