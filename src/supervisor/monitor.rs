//! Exit monitor: detects worker processes that ended on their own.
//!
//! Periodically asks the supervisor to reap exited workers. Each one is
//! removed from the registry and logged; nothing is restarted. A restart is
//! always an explicit start request.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::Supervisor;

/// Spawn a background task that polls for exited workers every `interval`
/// until `cancel` fires.
#[must_use]
pub fn spawn_exit_monitor(
    supervisor: Supervisor,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("exit monitor shutting down");
                    break;
                }
                () = tokio::time::sleep(interval) => {}
            }

            for exited in supervisor.reap_exited().await {
                warn!(token = %exited.token, status = %exited.status, "worker process exited unexpectedly");
            }
        }
    })
}
