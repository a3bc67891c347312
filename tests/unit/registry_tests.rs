//! Unit tests for registry reservations, promotion and removal.

use std::sync::Arc;

use chrono::Utc;

use bot_supervisor::channel::ChannelAddress;
use bot_supervisor::supervisor::{
    Lookup, Registry, Removed, StartProgress, Worker, WorkerState,
};
use bot_supervisor::AppError;

use crate::support::{endpoint_pair, FakeProcess};

fn worker(label: &str) -> Arc<Worker> {
    let (endpoint, _client) = endpoint_pair();
    let (process, _probe) = FakeProcess::new(42);
    Arc::new(Worker::new(
        label.to_owned(),
        ChannelAddress::new("test", 1),
        Utc::now(),
        Box::new(process),
        endpoint,
    ))
}

#[tokio::test]
async fn second_reservation_for_a_token_is_refused() {
    let registry = Registry::new();
    let _first = registry.reserve("tok", "tok").await.unwrap();

    let err = registry.reserve("tok", "tok").await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyRunning(_)));
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn released_reservation_frees_the_token() {
    let registry = Registry::new();
    let reservation = registry.reserve("tok", "tok").await.unwrap();
    registry.release(&reservation).await;

    assert!(registry.is_empty().await);
    registry.reserve("tok", "tok").await.unwrap();
}

#[tokio::test]
async fn promotion_registers_the_worker() {
    let registry = Registry::new();
    let reservation = registry.reserve("tok", "tok").await.unwrap();
    let worker = worker("tok");

    registry.promote(&reservation, Arc::clone(&worker)).await.unwrap();

    match registry.lookup("tok").await {
        Some(Lookup::Running(found)) => assert!(Arc::ptr_eq(&found, &worker)),
        other => panic!("expected running worker, got {other:?}"),
    }
    let running = registry.running().await;
    assert_eq!(running.len(), 1);
}

#[tokio::test]
async fn removing_a_starting_slot_cancels_and_revokes_it() {
    let registry = Registry::new();
    let reservation = registry.reserve("tok", "tok").await.unwrap();

    let Some(Removed::Starting(progress)) = registry.remove("tok").await else {
        panic!("expected a starting slot");
    };
    assert!(reservation.cancel_token().is_cancelled());
    assert!(!progress.borrow().is_terminal());

    let err = registry
        .promote(&reservation, worker("tok"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Cancelled(_)));
    assert!(registry.lookup("tok").await.is_none());

    reservation.fail(err);
    assert!(progress.borrow().is_terminal());
}

#[tokio::test]
async fn stale_release_does_not_touch_a_newer_reservation() {
    let registry = Registry::new();
    let old = registry.reserve("tok", "tok").await.unwrap();
    registry.remove("tok").await;
    let _new = registry.reserve("tok", "tok").await.unwrap();

    registry.release(&old).await;
    assert!(registry.contains("tok").await);
}

#[tokio::test]
async fn starting_lookup_observes_progress() {
    let registry = Registry::new();
    let reservation = registry.reserve("tok", "tok").await.unwrap();

    let Some(Lookup::Starting(mut progress)) = registry.lookup("tok").await else {
        panic!("expected a starting slot");
    };
    assert_eq!(
        *progress.borrow(),
        StartProgress::State(WorkerState::Spawning)
    );

    reservation.fail(AppError::StartupTimeout("slow".into()));
    let outcome = progress
        .wait_for(StartProgress::is_terminal)
        .await
        .unwrap()
        .clone();
    assert_eq!(
        outcome,
        StartProgress::Failed(AppError::StartupTimeout("slow".into()))
    );
}

#[tokio::test]
async fn snapshot_includes_starting_slots() {
    let registry = Registry::new();
    let reservation = registry.reserve("secret-token", "secret…").await.unwrap();
    reservation.publish(WorkerState::AwaitingReady);

    let infos = registry.snapshot().await;
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].token, "secret…");
    assert_eq!(infos[0].state, WorkerState::AwaitingReady);
    assert_eq!(infos[0].pid, None);
}

#[tokio::test]
async fn remove_worker_ignores_a_replaced_entry() {
    let registry = Registry::new();
    let reservation = registry.reserve("tok", "tok").await.unwrap();
    let current = worker("tok");
    registry.promote(&reservation, Arc::clone(&current)).await.unwrap();

    assert!(!registry.remove_worker("tok", &worker("tok")).await);
    assert!(registry.remove_worker("tok", &current).await);
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn closed_registry_refuses_reservations_and_drains() {
    let registry = Registry::new();
    let starting = registry.reserve("a", "a").await.unwrap();
    let running = registry.reserve("b", "b").await.unwrap();
    registry.promote(&running, worker("b")).await.unwrap();

    let drained = registry.close_and_drain().await;
    assert_eq!(drained.len(), 2);
    assert!(starting.cancel_token().is_cancelled());
    assert!(registry.is_closed().await);
    assert!(registry.is_empty().await);

    let err = registry.reserve("c", "c").await.unwrap_err();
    assert!(matches!(err, AppError::ShuttingDown(_)));
}
