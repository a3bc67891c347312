//! Integration tests for the HTTP control plane.
//!
//! Serves the router on an ephemeral port over an in-memory worker world.

use serde_json::{json, Value};

use super::test_helpers::spawn_http;
use crate::support::{fake_supervisor, test_config, Behavior, FakeWorld};

#[tokio::test]
async fn root_and_health_respond() {
    let world = FakeWorld::new();
    let (base_url, ct) = spawn_http(fake_supervisor(&world, test_config())).await;

    let resp = reqwest::get(format!("{base_url}/")).await.expect("GET /");
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.expect("body"), "Hello, World!");

    let resp = reqwest::get(format!("{base_url}/health"))
        .await
        .expect("GET /health");
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.expect("body"), "ok");

    ct.cancel();
}

#[tokio::test]
async fn create_update_stop_lifecycle() {
    let world = FakeWorld::new();
    let (base_url, ct) = spawn_http(fake_supervisor(&world, test_config())).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base_url}/create/token-abc"))
        .json(&json!({ "data": { "guild": { "prefix": "!" } }, "intents": 513 }))
        .send()
        .await
        .expect("POST /create");
    assert_eq!(resp.status(), 200);
    let info: Value = resp.json().await.expect("json");
    assert_eq!(info["state"], "ready");
    assert_eq!(info["token"], "token-…");

    let spec = world.specs().pop().unwrap();
    assert_eq!(spec.args[2], r#"{"guild":{"prefix":"!"}}"#);
    assert_eq!(spec.args[3], "513");

    let resp = client
        .post(format!("{base_url}/update/token-abc"))
        .json(&json!({ "command": "reload" }))
        .send()
        .await
        .expect("POST /update");
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body, json!({ "status": "sent" }));
    assert_eq!(
        world.wait_for_replies("token-abc", 1).await,
        vec![r#"{"command":"reload"}"#]
    );

    let resp = client
        .post(format!("{base_url}/stop/token-abc"))
        .send()
        .await
        .expect("POST /stop");
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["status"], "stopped");

    let resp = client
        .post(format!("{base_url}/stop/token-abc"))
        .send()
        .await
        .expect("POST /stop again");
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["error"], "not_found");

    ct.cancel();
}

#[tokio::test]
async fn create_without_body_uses_default_intents() {
    let world = FakeWorld::new();
    let (base_url, ct) = spawn_http(fake_supervisor(&world, test_config())).await;

    let resp = reqwest::Client::new()
        .post(format!("{base_url}/create/tok"))
        .send()
        .await
        .expect("POST /create");
    assert_eq!(resp.status(), 200);

    let spec = world.specs().pop().unwrap();
    assert_eq!(spec.args[2], "{}");
    assert_eq!(spec.args[3], "3243773");

    ct.cancel();
}

#[tokio::test]
async fn duplicate_create_conflicts() {
    let world = FakeWorld::new();
    let (base_url, ct) = spawn_http(fake_supervisor(&world, test_config())).await;
    let client = reqwest::Client::new();

    let first = client
        .post(format!("{base_url}/create/tok"))
        .send()
        .await
        .expect("first create");
    assert_eq!(first.status(), 200);

    let second = client
        .post(format!("{base_url}/create/tok"))
        .send()
        .await
        .expect("second create");
    assert_eq!(second.status(), 409);
    let body: Value = second.json().await.expect("json");
    assert_eq!(body["error"], "already_running");

    ct.cancel();
}

#[tokio::test]
async fn malformed_bodies_are_bad_requests() {
    let world = FakeWorld::new();
    let (base_url, ct) = spawn_http(fake_supervisor(&world, test_config())).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base_url}/create/tok"))
        .json(&json!({ "data": [1, 2, 3] }))
        .send()
        .await
        .expect("create with array data");
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{base_url}/update/tok"))
        .body("not json")
        .send()
        .await
        .expect("update with garbage");
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["error"], "invalid_payload");

    let resp = client
        .post(format!("{base_url}/update/tok"))
        .json(&json!("just a string"))
        .send()
        .await
        .expect("update with non-object");
    assert_eq!(resp.status(), 400);

    assert_eq!(world.launches(), 0);
    ct.cancel();
}

#[tokio::test]
async fn update_unknown_token_is_not_found() {
    let world = FakeWorld::new();
    let (base_url, ct) = spawn_http(fake_supervisor(&world, test_config())).await;

    let resp = reqwest::Client::new()
        .post(format!("{base_url}/update/nobody"))
        .json(&json!({ "command": "reload" }))
        .send()
        .await
        .expect("POST /update");
    assert_eq!(resp.status(), 404);

    ct.cancel();
}

#[tokio::test]
async fn status_update_is_forwarded_with_defaults() {
    let world = FakeWorld::new();
    let (base_url, ct) = spawn_http(fake_supervisor(&world, test_config())).await;
    let client = reqwest::Client::new();
    client
        .post(format!("{base_url}/create/tok"))
        .send()
        .await
        .expect("create");

    let resp = client
        .post(format!("{base_url}/status/tok"))
        .json(&json!({ "activity": "chess" }))
        .send()
        .await
        .expect("POST /status");
    assert_eq!(resp.status(), 200);

    let replies = world.wait_for_replies("tok", 1).await;
    let forwarded: Value = serde_json::from_str(&replies[0]).expect("json reply");
    assert_eq!(
        forwarded,
        json!({
            "command": "update_status",
            "status": "online",
            "activity": "chess",
            "activity_type": "playing",
        })
    );

    ct.cancel();
}

#[tokio::test]
async fn invalid_status_values_are_rejected() {
    let world = FakeWorld::new();
    let (base_url, ct) = spawn_http(fake_supervisor(&world, test_config())).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base_url}/status/tok"))
        .json(&json!({ "status": "sleepy" }))
        .send()
        .await
        .expect("bad status");
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{base_url}/status/tok"))
        .json(&json!({ "activity_type": "dancing" }))
        .send()
        .await
        .expect("bad activity type");
    assert_eq!(resp.status(), 400);

    ct.cancel();
}

#[tokio::test]
async fn startup_timeout_maps_to_gateway_timeout() {
    let world = FakeWorld::new();
    world.set_behavior(Behavior::Silent);
    let mut config = test_config();
    config.timeouts.startup_seconds = 1;
    let (base_url, ct) = spawn_http(fake_supervisor(&world, config)).await;

    let resp = reqwest::Client::new()
        .post(format!("{base_url}/create/tok"))
        .send()
        .await
        .expect("POST /create");
    assert_eq!(resp.status(), 504);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["error"], "startup_timeout");

    let resp = reqwest::get(format!("{base_url}/bots")).await.expect("GET /bots");
    let bots: Value = resp.json().await.expect("json");
    assert_eq!(bots, json!([]));

    ct.cancel();
}

#[tokio::test]
async fn bots_lists_running_workers() {
    let world = FakeWorld::new();
    let (base_url, ct) = spawn_http(fake_supervisor(&world, test_config())).await;
    let client = reqwest::Client::new();
    for token in ["alpha", "beta"] {
        client
            .post(format!("{base_url}/create/{token}"))
            .send()
            .await
            .expect("create");
    }

    let bots: Value = reqwest::get(format!("{base_url}/bots"))
        .await
        .expect("GET /bots")
        .json()
        .await
        .expect("json");
    let bots = bots.as_array().unwrap();
    assert_eq!(bots.len(), 2);
    assert!(bots.iter().all(|bot| bot["state"] == "ready"));

    ct.cancel();
}
