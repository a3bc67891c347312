//! A registered worker: one process paired with one reply endpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::{ChannelAddress, ReplyEndpoint};
use crate::process::WorkerProcess;
use crate::{AppError, Result};

/// How long a failed exchange waits for the process to report an exit.
const EXIT_SETTLE: Duration = Duration::from_millis(250);

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Lifecycle state of a worker as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Reserved; process not launched yet.
    Spawning,
    /// Process launched; waiting for the readiness token.
    AwaitingReady,
    /// Handshake complete; application messages may flow.
    Ready,
    /// Alternation state unknown; the worker must be stopped.
    Faulted,
}

/// Serializable snapshot of a worker for control-plane responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerInfo {
    /// Redacted bot token.
    pub token: String,
    /// Reply channel address, once allocated.
    pub channel: Option<String>,
    /// OS process id, once spawned.
    pub pid: Option<u32>,
    /// Current lifecycle state.
    pub state: WorkerState,
    /// When the start request was accepted.
    pub started_at: DateTime<Utc>,
}

/// One running worker.
///
/// The endpoint sits behind a fair async mutex: concurrent sends for the same
/// token queue up and run one full receive/send round trip each, in call
/// order. The process handle sits behind a plain mutex because every
/// operation on it is synchronous.
#[derive(Debug)]
pub struct Worker {
    label: String,
    address: ChannelAddress,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    process: Mutex<Option<Box<dyn WorkerProcess>>>,
    endpoint: tokio::sync::Mutex<ReplyEndpoint>,
    faulted: AtomicBool,
    cancel: CancellationToken,
}

impl Worker {
    /// Pair a ready process with its handshaken endpoint.
    #[must_use]
    pub fn new(
        label: String,
        address: ChannelAddress,
        started_at: DateTime<Utc>,
        process: Box<dyn WorkerProcess>,
        endpoint: ReplyEndpoint,
    ) -> Self {
        Self {
            label,
            address,
            pid: process.id(),
            started_at,
            process: Mutex::new(Some(process)),
            endpoint: tokio::sync::Mutex::new(endpoint),
            faulted: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// Redacted token for log fields.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        if self.is_faulted() {
            WorkerState::Faulted
        } else {
            WorkerState::Ready
        }
    }

    /// Whether a previous exchange left the endpoint unusable.
    #[must_use]
    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::SeqCst)
    }

    /// Snapshot for control-plane responses.
    #[must_use]
    pub fn info(&self) -> WorkerInfo {
        WorkerInfo {
            token: self.label.clone(),
            channel: Some(self.address.to_string()),
            pid: self.pid,
            state: self.state(),
            started_at: self.started_at,
        }
    }

    /// `Some` with a description once the process has exited.
    pub fn exit_status(&self) -> Option<String> {
        let mut guard = self.process.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(process) => process.exit_status(),
            None => Some("already reaped".into()),
        }
    }

    /// Run one receive/send round trip delivering `payload` to the worker.
    ///
    /// The pending request is consumed and discarded first; it only exists
    /// so the worker can pick up the reply. Waiting for earlier sends to the
    /// same worker counts against `deadline` but never faults the worker;
    /// running out of time mid-exchange does.
    ///
    /// # Errors
    ///
    /// - `AppError::Timeout`: `deadline` elapsed.
    /// - `AppError::Faulted`: an earlier exchange left the endpoint unusable.
    /// - `AppError::NotRunning`: the process exited, before or during the
    ///   exchange, or the worker was stopped. Never faults the worker.
    /// - `AppError::OutOfOrder` / `Recv` / `Send`: the exchange failed; the
    ///   worker is faulted.
    pub async fn exchange(&self, payload: Bytes, deadline: Duration) -> Result<()> {
        let started = tokio::time::Instant::now();

        let mut endpoint = tokio::select! {
            biased;

            () = self.cancel.cancelled() => {
                return Err(AppError::NotRunning("worker was stopped".into()));
            }
            guard = tokio::time::timeout(deadline, self.endpoint.lock()) => {
                guard.map_err(|_| AppError::Timeout(format!(
                    "worker busy with earlier messages for {deadline:?}"
                )))?
            }
        };

        if self.is_faulted() {
            return Err(AppError::Faulted(
                "worker is unusable after a failed exchange; stop and restart it".into(),
            ));
        }
        if let Some(status) = self.exit_status() {
            return Err(AppError::NotRunning(format!("worker process {status}")));
        }

        let remaining = deadline.saturating_sub(started.elapsed());
        let label = self.label.as_str();
        let round_trip = async {
            let request = endpoint.receive().await?;
            debug!(
                token = %label,
                bytes = request.len(),
                "discarding pending worker request before reply"
            );
            endpoint.send(payload).await
        };

        let result = tokio::select! {
            biased;

            () = self.cancel.cancelled() => {
                Err(AppError::NotRunning("worker was stopped during the exchange".into()))
            }
            outcome = tokio::time::timeout(remaining, round_trip) => {
                outcome.unwrap_or_else(|_| Err(AppError::Timeout(format!(
                    "no request from worker within {deadline:?}"
                ))))
            }
        };

        // A closed channel usually means the process died; its exit can
        // lag the socket closing by a few milliseconds.
        let result = if matches!(result, Err(AppError::Recv(_) | AppError::Send(_))) {
            match self.settled_exit_status(EXIT_SETTLE).await {
                Some(status) => Err(AppError::NotRunning(format!("worker process {status}"))),
                None => result,
            }
        } else {
            result
        };

        if let Err(ref err) = result {
            if err.faults_worker() {
                self.faulted.store(true, Ordering::SeqCst);
                warn!(token = %self.label, %err, "worker faulted; explicit stop required");
            }
        }
        result
    }

    /// Poll the process for up to `window` until it reports an exit.
    async fn settled_exit_status(&self, window: Duration) -> Option<String> {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            if let Some(status) = self.exit_status() {
                return Some(status);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }
    }

    /// Tear the worker down: cancel in-flight exchanges, signal the process
    /// group, hand the process to the reaper and close the endpoint.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Signal` if the termination signal could not be
    /// delivered. Cleanup still runs to completion.
    pub async fn shutdown(&self, grace: Duration) -> Result<()> {
        self.cancel.cancel();

        let process = self
            .process
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let mut outcome = Ok(());
        if let Some(mut process) = process {
            match process.terminate_group() {
                Ok(()) => {}
                Err(AppError::NotRunning(reason)) => {
                    debug!(token = %self.label, %reason, "worker already exited");
                }
                Err(err) => {
                    warn!(token = %self.label, %err, "failed to signal worker process group");
                    outcome = Err(err);
                }
            }
            process.reap(grace);
        }

        self.endpoint.lock().await.close();
        info!(token = %self.label, "worker stopped");
        outcome
    }
}
