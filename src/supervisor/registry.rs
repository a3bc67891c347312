//! Token → worker registry.
//!
//! Every token maps to at most one [`Slot`]. A slot is either `Starting`, a
//! reservation owned by the task running the start sequence, or `Running`,
//! a fully constructed [`Worker`]. The check-absent-then-reserve and
//! check-present-then-remove sequences each run under a single lock
//! acquisition, so two starts for one token can never both succeed and a
//! removed token is gone for every later caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use super::worker::{Worker, WorkerInfo, WorkerState};
use crate::{AppError, Result};

/// Progress of a start sequence, observed by sends that arrive early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartProgress {
    /// The start is still running, or has just finished successfully.
    State(WorkerState),
    /// The start failed; the slot is gone.
    Failed(AppError),
}

impl StartProgress {
    /// Whether no further progress will be published.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::State(WorkerState::Ready) | Self::Failed(_))
    }
}

/// Bookkeeping for a token whose worker is being started.
#[derive(Debug)]
struct PendingStart {
    generation: u64,
    label: String,
    started_at: DateTime<Utc>,
    progress: watch::Receiver<StartProgress>,
    cancel: CancellationToken,
}

#[derive(Debug)]
enum Slot {
    Starting(PendingStart),
    Running(Arc<Worker>),
}

/// Exclusive right to populate one token, handed to the start sequence.
///
/// Only the reservation that created a `Starting` slot can promote or
/// release it; a slot revoked by `stop` or `shutdown_all` stays revoked.
#[derive(Debug)]
pub struct Reservation {
    token: String,
    generation: u64,
    started_at: DateTime<Utc>,
    progress: watch::Sender<StartProgress>,
    cancel: CancellationToken,
}

impl Reservation {
    /// Token this reservation holds.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// When the reservation was taken.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Fires when the start is revoked.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Publish a lifecycle transition to waiting senders.
    pub fn publish(&self, state: WorkerState) {
        self.progress.send_replace(StartProgress::State(state));
    }

    /// Publish the start failure to waiting senders.
    pub fn fail(&self, err: AppError) {
        self.progress.send_replace(StartProgress::Failed(err));
    }
}

/// What [`Registry::lookup`] found for a token.
#[derive(Debug)]
pub enum Lookup {
    /// A registered worker.
    Running(Arc<Worker>),
    /// A start in progress; wait on the receiver for its outcome.
    Starting(watch::Receiver<StartProgress>),
}

/// A slot taken out of the registry.
#[derive(Debug)]
pub enum Removed {
    /// A start was revoked; the token has been cancelled already. The
    /// receiver turns terminal once the start task has torn its process down.
    Starting(watch::Receiver<StartProgress>),
    /// A registered worker, now owned by the caller for teardown.
    Running(Arc<Worker>),
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<String, Slot>,
    closed: bool,
}

/// Concurrency-safe mapping from bot token to worker slot.
#[derive(Debug, Default)]
pub struct Registry {
    inner: Mutex<Inner>,
    next_generation: AtomicU64,
}

impl Registry {
    /// Create an empty, open registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `token` for a new worker.
    ///
    /// # Errors
    ///
    /// - `AppError::ShuttingDown` once [`close_and_drain`](Self::close_and_drain) ran.
    /// - `AppError::AlreadyRunning` if the token has any slot.
    pub async fn reserve(&self, token: &str, label: &str) -> Result<Reservation> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(AppError::ShuttingDown(
                "supervisor is shutting down; no new workers accepted".into(),
            ));
        }
        if inner.slots.contains_key(token) {
            return Err(AppError::AlreadyRunning(format!(
                "a worker for {label} is already running or starting"
            )));
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let started_at = Utc::now();
        let (progress, watcher) = watch::channel(StartProgress::State(WorkerState::Spawning));
        let cancel = CancellationToken::new();

        inner.slots.insert(
            token.to_owned(),
            Slot::Starting(PendingStart {
                generation,
                label: label.to_owned(),
                started_at,
                progress: watcher,
                cancel: cancel.clone(),
            }),
        );

        Ok(Reservation {
            token: token.to_owned(),
            generation,
            started_at,
            progress,
            cancel,
        })
    }

    /// Replace the reservation's slot with the running `worker`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Cancelled` if the reservation was revoked in the
    /// meantime. The caller still owns `worker` and must tear it down.
    pub async fn promote(&self, reservation: &Reservation, worker: Arc<Worker>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !holds(&inner, reservation) {
            return Err(AppError::Cancelled(
                "start was revoked by a concurrent stop or shutdown".into(),
            ));
        }
        inner
            .slots
            .insert(reservation.token.clone(), Slot::Running(worker));
        Ok(())
    }

    /// Drop the reservation's slot if it still holds it.
    pub async fn release(&self, reservation: &Reservation) {
        let mut inner = self.inner.lock().await;
        if holds(&inner, reservation) {
            inner.slots.remove(&reservation.token);
        }
    }

    /// Find the slot registered for `token`.
    pub async fn lookup(&self, token: &str) -> Option<Lookup> {
        let inner = self.inner.lock().await;
        inner.slots.get(token).map(|slot| match slot {
            Slot::Starting(pending) => Lookup::Starting(pending.progress.clone()),
            Slot::Running(worker) => Lookup::Running(Arc::clone(worker)),
        })
    }

    /// Remove `token`'s slot. A `Starting` slot is cancelled on the way out.
    pub async fn remove(&self, token: &str) -> Option<Removed> {
        let mut inner = self.inner.lock().await;
        inner.slots.remove(token).map(revoke)
    }

    /// Remove `token` only while it still maps to `worker`.
    pub async fn remove_worker(&self, token: &str, worker: &Arc<Worker>) -> bool {
        let mut inner = self.inner.lock().await;
        let same = matches!(
            inner.slots.get(token),
            Some(Slot::Running(current)) if Arc::ptr_eq(current, worker)
        );
        if same {
            inner.slots.remove(token);
        }
        same
    }

    /// Refuse further reservations and take every slot out.
    pub async fn close_and_drain(&self) -> Vec<(String, Removed)> {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        inner
            .slots
            .drain()
            .map(|(token, slot)| (token, revoke(slot)))
            .collect()
    }

    /// Snapshot of every slot, oldest first.
    pub async fn snapshot(&self) -> Vec<WorkerInfo> {
        let inner = self.inner.lock().await;
        let mut infos: Vec<WorkerInfo> = inner
            .slots
            .values()
            .map(|slot| match slot {
                Slot::Running(worker) => worker.info(),
                Slot::Starting(pending) => {
                    let state = match &*pending.progress.borrow() {
                        StartProgress::State(state) => *state,
                        StartProgress::Failed(_) => WorkerState::Faulted,
                    };
                    WorkerInfo {
                        token: pending.label.clone(),
                        channel: None,
                        pid: None,
                        state,
                        started_at: pending.started_at,
                    }
                }
            })
            .collect();
        infos.sort_by_key(|info| info.started_at);
        infos
    }

    /// Every registered worker, without `Starting` slots.
    pub async fn running(&self) -> Vec<(String, Arc<Worker>)> {
        let inner = self.inner.lock().await;
        inner
            .slots
            .iter()
            .filter_map(|(token, slot)| match slot {
                Slot::Running(worker) => Some((token.clone(), Arc::clone(worker))),
                Slot::Starting(_) => None,
            })
            .collect()
    }

    /// Whether `token` has any slot.
    pub async fn contains(&self, token: &str) -> bool {
        self.inner.lock().await.slots.contains_key(token)
    }

    /// Number of slots, starting ones included.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.slots.len()
    }

    /// Whether the registry holds no slot at all.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.slots.is_empty()
    }

    /// Whether new reservations are refused.
    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.closed
    }
}

/// Whether `reservation`'s slot is still in place.
fn holds(inner: &Inner, reservation: &Reservation) -> bool {
    matches!(
        inner.slots.get(&reservation.token),
        Some(Slot::Starting(pending)) if pending.generation == reservation.generation
    )
}

fn revoke(slot: Slot) -> Removed {
    match slot {
        Slot::Starting(pending) => {
            pending.cancel.cancel();
            Removed::Starting(pending.progress)
        }
        Slot::Running(worker) => Removed::Running(worker),
    }
}
