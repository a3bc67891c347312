//! Worker supervisor: start, send, stop and shutdown for token-keyed workers.
//!
//! A start runs reserve → bind → spawn → handshake → promote. Sends to a
//! token whose start is still in flight wait for its outcome; a message is
//! never delivered before the readiness token has been consumed. Starts and
//! sends run on tracked tasks, so a caller that goes away mid-operation
//! cannot leave a reservation or an endpoint half-driven.

pub mod monitor;
pub mod registry;
pub mod worker;

use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::join_all;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::channel::handshake::complete_handshake;
use crate::channel::{AddressAllocator, ChannelFactory, LocalSocketFactory};
use crate::config::GlobalConfig;
use crate::process::{LaunchSpec, ProcessLauncher, ProcessSpawner, WorkerProcess};
use crate::{AppError, Result};

pub use registry::{Lookup, Registry, Removed, Reservation, StartProgress};
pub use worker::{Worker, WorkerInfo, WorkerState};

/// Characters of a token kept visible in logs and listings.
const VISIBLE_TOKEN_CHARS: usize = 6;

/// Shorten `token` to a prefix safe to log.
#[must_use]
pub fn redact_token(token: &str) -> String {
    let mut chars = token.chars();
    let visible: String = chars.by_ref().take(VISIBLE_TOKEN_CHARS).collect();
    if chars.next().is_some() {
        format!("{visible}…")
    } else {
        visible
    }
}

/// A worker removed by [`Supervisor::reap_exited`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitedWorker {
    /// Redacted token.
    pub token: String,
    /// How the process ended.
    pub status: String,
}

/// Owns the registry and drives every worker lifecycle operation.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct Supervisor {
    config: Arc<GlobalConfig>,
    registry: Arc<Registry>,
    launcher: Arc<dyn ProcessLauncher>,
    channels: Arc<dyn ChannelFactory>,
    addresses: Arc<AddressAllocator>,
    tasks: TaskTracker,
}

impl Supervisor {
    /// Assemble a supervisor from its collaborators.
    #[must_use]
    pub fn new(
        config: Arc<GlobalConfig>,
        registry: Arc<Registry>,
        launcher: Arc<dyn ProcessLauncher>,
        channels: Arc<dyn ChannelFactory>,
    ) -> Self {
        let addresses = Arc::new(AddressAllocator::new(
            config.channel_prefix.clone(),
            config.base_port,
        ));
        Self {
            config,
            registry,
            launcher,
            channels,
            addresses,
            tasks: TaskTracker::new(),
        }
    }

    /// Supervisor spawning real processes over local sockets.
    #[must_use]
    pub fn with_defaults(config: Arc<GlobalConfig>) -> Self {
        Self::new(
            config,
            Arc::new(Registry::new()),
            Arc::new(ProcessSpawner),
            Arc::new(LocalSocketFactory),
        )
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// The registry this supervisor populates.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Start a worker for `token`, handing it `payload` on its command line.
    ///
    /// # Errors
    ///
    /// See [`start_with_args`](Self::start_with_args).
    pub async fn start(&self, token: &str, payload: &str) -> Result<WorkerInfo> {
        self.start_with_args(token, payload, Vec::new()).await
    }

    /// Start a worker for `token` with extra trailing spawn arguments.
    ///
    /// Returns once the worker completed the readiness handshake and is
    /// registered. Every failure is rolled back before it is returned.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidPayload`: empty token.
    /// - `AppError::AlreadyRunning`: the token has a worker or a start in flight.
    /// - `AppError::ShuttingDown`: [`shutdown_all`](Self::shutdown_all) began.
    /// - `AppError::Bind` / `Spawn`: the channel or process could not be created.
    /// - `AppError::StartupTimeout` / `UnexpectedFirstMessage` / `NotRunning`:
    ///   the readiness handshake failed.
    /// - `AppError::Cancelled`: a concurrent stop or shutdown revoked the start.
    pub async fn start_with_args(
        &self,
        token: &str,
        payload: &str,
        extra_args: Vec<String>,
    ) -> Result<WorkerInfo> {
        if token.is_empty() {
            return Err(AppError::InvalidPayload("token must not be empty".into()));
        }

        let label = redact_token(token);
        let span = info_span!("start_worker", token = %label);
        let this = self.clone();
        let token = token.to_owned();
        let payload = payload.to_owned();

        self.tasks
            .spawn(async move { this.run_start(token, label, payload, extra_args).await }.instrument(span))
            .await
            .map_err(|err| AppError::Cancelled(format!("start task aborted: {err}")))?
    }

    async fn run_start(
        &self,
        token: String,
        label: String,
        payload: String,
        extra_args: Vec<String>,
    ) -> Result<WorkerInfo> {
        let reservation = self.registry.reserve(&token, &label).await?;
        info!("start reserved");

        let worker = match self
            .launch_and_handshake(&reservation, &label, &payload, extra_args)
            .await
        {
            Ok(worker) => Arc::new(worker),
            Err(err) => {
                self.registry.release(&reservation).await;
                reservation.fail(err.clone());
                warn!(%err, "worker start failed");
                return Err(err);
            }
        };

        if let Err(err) = self
            .registry
            .promote(&reservation, Arc::clone(&worker))
            .await
        {
            warn!(%err, "start revoked after handshake; tearing worker down");
            if let Err(teardown) = worker.shutdown(self.config.timeouts.kill_grace()).await {
                warn!(err = %teardown, "teardown of revoked worker failed");
            }
            reservation.fail(err.clone());
            return Err(err);
        }

        reservation.publish(WorkerState::Ready);
        info!(pid = worker.info().pid.unwrap_or(0), "worker ready and registered");
        Ok(worker.info())
    }

    async fn launch_and_handshake(
        &self,
        reservation: &Reservation,
        label: &str,
        payload: &str,
        extra_args: Vec<String>,
    ) -> Result<Worker> {
        let cancel = reservation.cancel_token();
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled("start revoked before spawn".into()));
        }

        let address = self.addresses.allocate()?;
        let mut binding = self.channels.bind(&address)?;

        let mut args = self.config.worker_args.clone();
        args.push(reservation.token().to_owned());
        args.push(address.as_str().to_owned());
        args.push(payload.to_owned());
        args.extend(extra_args);

        let mut env: Vec<(String, String)> = self
            .config
            .worker_env
            .iter()
            .map(|(key, val)| (key.clone(), val.clone()))
            .collect();
        env.sort();

        let spec = LaunchSpec {
            executable: self.config.worker_executable.clone(),
            args,
            env,
            token: reservation.token().to_owned(),
            channel: address.clone(),
            label: label.to_owned(),
        };

        let mut process = self.launcher.launch(&spec)?;
        reservation.publish(WorkerState::AwaitingReady);
        debug!(%address, "awaiting readiness token");

        let handshake = complete_handshake(
            binding.as_mut(),
            self.config.timeouts.startup(),
            cancel,
            || process.exit_status(),
        )
        .await;
        drop(binding);

        match handshake {
            Ok(endpoint) => Ok(Worker::new(
                label.to_owned(),
                address,
                reservation.started_at(),
                process,
                endpoint,
            )),
            Err(err) => {
                self.discard(process, label);
                Err(err)
            }
        }
    }

    /// Terminate a process that never became a registered worker.
    fn discard(&self, mut process: Box<dyn WorkerProcess>, label: &str) {
        match process.terminate_group() {
            Ok(()) => {}
            Err(AppError::NotRunning(reason)) => {
                debug!(token = %label, %reason, "failed worker already exited");
            }
            Err(err) => warn!(token = %label, %err, "failed to signal failed worker"),
        }
        process.reap(self.config.timeouts.kill_grace());
    }

    /// Deliver `message` to `token`'s worker within the configured deadline.
    ///
    /// # Errors
    ///
    /// See [`send_with_deadline`](Self::send_with_deadline).
    pub async fn send(&self, token: &str, message: impl Into<Bytes>) -> Result<()> {
        self.send_with_deadline(token, message, self.config.timeouts.send())
            .await
    }

    /// Deliver `message` to `token`'s worker: consume its pending request,
    /// then reply with `message`.
    ///
    /// A send to a worker that is still starting waits for the start to
    /// finish. The wait is bounded by the startup timeout, not `deadline`.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidPayload`: empty message.
    /// - `AppError::NotFound`: no worker registered for the token.
    /// - The start failure, when the send waited on a start that failed.
    /// - `AppError::Faulted` / `NotRunning` / `Timeout` / `OutOfOrder` /
    ///   `Recv` / `Send`: see [`Worker::exchange`].
    pub async fn send_with_deadline(
        &self,
        token: &str,
        message: impl Into<Bytes>,
        deadline: std::time::Duration,
    ) -> Result<()> {
        let message = message.into();
        if message.is_empty() {
            return Err(AppError::InvalidPayload("message must not be empty".into()));
        }

        let label = redact_token(token);
        let span = info_span!("send_message", token = %label, bytes = message.len());
        let worker = self.wait_for_worker(token, &label).instrument(span.clone()).await?;

        self.tasks
            .spawn(async move { worker.exchange(message, deadline).await }.instrument(span))
            .await
            .map_err(|err| AppError::Cancelled(format!("send task aborted: {err}")))?
    }

    /// Resolve `token` to a registered worker, waiting out a pending start.
    async fn wait_for_worker(&self, token: &str, label: &str) -> Result<Arc<Worker>> {
        loop {
            match self.registry.lookup(token).await {
                None => {
                    return Err(AppError::NotFound(format!(
                        "no worker registered for {label}"
                    )));
                }
                Some(Lookup::Running(worker)) => return Ok(worker),
                Some(Lookup::Starting(mut progress)) => {
                    debug!("worker still starting; waiting for readiness");
                    let outcome = match progress.wait_for(StartProgress::is_terminal).await {
                        Ok(current) => current.clone(),
                        Err(_) => {
                            return Err(AppError::Cancelled(
                                "start abandoned before the worker became ready".into(),
                            ));
                        }
                    };
                    if let StartProgress::Failed(err) = outcome {
                        return Err(err);
                    }
                }
            }
        }
    }

    /// Stop `token`'s worker, or cancel its start.
    ///
    /// Once the registry entry is gone every later send or stop for the
    /// token fails with `NotFound`. A pending start is cancelled and its
    /// process group signalled before this returns; reaping continues in the
    /// background.
    ///
    /// # Errors
    ///
    /// - `AppError::NotFound`: nothing registered for the token.
    /// - `AppError::Signal`: the termination signal could not be delivered;
    ///   the entry is removed regardless.
    pub async fn stop(&self, token: &str) -> Result<()> {
        let label = redact_token(token);
        let span = info_span!("stop_worker", token = %label);
        async {
            match self.registry.remove(token).await {
                None => Err(AppError::NotFound(format!(
                    "no worker registered for {label}"
                ))),
                Some(Removed::Starting(mut progress)) => {
                    // The start task owns the process; wait for its teardown.
                    let _ = progress.wait_for(StartProgress::is_terminal).await;
                    info!("pending start cancelled");
                    Ok(())
                }
                Some(Removed::Running(worker)) => {
                    worker.shutdown(self.config.timeouts.kill_grace()).await
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Refuse new starts, stop every worker and wait for in-flight starts
    /// and sends to settle.
    pub async fn shutdown_all(&self) {
        let drained = self.registry.close_and_drain().await;
        info!(count = drained.len(), "shutting down all workers");

        let grace = self.config.timeouts.kill_grace();
        join_all(drained.into_iter().map(|(token, removed)| async move {
            let label = redact_token(&token);
            match removed {
                Removed::Starting(_) => debug!(token = %label, "pending start cancelled"),
                Removed::Running(worker) => {
                    if let Err(err) = worker.shutdown(grace).await {
                        warn!(token = %label, %err, "worker shutdown failed");
                    }
                }
            }
        }))
        .await;

        self.tasks.close();
        self.tasks.wait().await;
        info!("all workers stopped");
    }

    /// Snapshot of every registered or starting worker.
    pub async fn list(&self) -> Vec<WorkerInfo> {
        self.registry.snapshot().await
    }

    /// Remove and tear down every worker whose process has exited.
    pub async fn reap_exited(&self) -> Vec<ExitedWorker> {
        let mut exited = Vec::new();
        for (token, worker) in self.registry.running().await {
            let Some(status) = worker.exit_status() else {
                continue;
            };
            if !self.registry.remove_worker(&token, &worker).await {
                continue;
            }
            if let Err(err) = worker.shutdown(self.config.timeouts.kill_grace()).await {
                warn!(token = %worker.label(), %err, "cleanup of exited worker failed");
            }
            exited.push(ExitedWorker {
                token: worker.label().to_owned(),
                status,
            });
        }
        exited
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
