//! Unit tests for IPC command routing.

use bot_supervisor::ipc::{dispatch_command, IpcRequest};

use crate::support::{fake_supervisor, test_config, FakeWorld};

fn request(command: &str, token: Option<&str>, message: Option<&str>) -> IpcRequest {
    IpcRequest {
        command: command.to_owned(),
        token: token.map(str::to_owned),
        message: message.map(str::to_owned),
    }
}

#[tokio::test]
async fn list_reports_registered_workers() {
    let world = FakeWorld::new();
    let supervisor = fake_supervisor(&world, test_config());
    supervisor.start("tok", "{}").await.unwrap();

    let response = dispatch_command(&request("list", None, None), &supervisor).await;

    assert!(response.ok);
    let data = response.data.unwrap();
    let workers = data["workers"].as_array().unwrap();
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0]["token"], "tok");
    assert_eq!(workers[0]["state"], "ready");
}

#[tokio::test]
async fn send_forwards_the_message() {
    let world = FakeWorld::new();
    let supervisor = fake_supervisor(&world, test_config());
    supervisor.start("tok", "{}").await.unwrap();

    let response =
        dispatch_command(&request("send", Some("tok"), Some("{\"x\":1}")), &supervisor).await;

    assert!(response.ok, "{response:?}");
    assert_eq!(world.wait_for_replies("tok", 1).await, vec!["{\"x\":1}"]);
}

#[tokio::test]
async fn stop_then_stop_again_is_not_found() {
    let world = FakeWorld::new();
    let supervisor = fake_supervisor(&world, test_config());
    supervisor.start("tok", "{}").await.unwrap();

    let first = dispatch_command(&request("stop", Some("tok"), None), &supervisor).await;
    assert!(first.ok);

    let second = dispatch_command(&request("stop", Some("tok"), None), &supervisor).await;
    assert!(!second.ok);
    assert!(second.error.unwrap().starts_with("not_found"));
}

#[tokio::test]
async fn missing_fields_are_reported() {
    let world = FakeWorld::new();
    let supervisor = fake_supervisor(&world, test_config());

    let response = dispatch_command(&request("stop", None, None), &supervisor).await;
    assert_eq!(response.error.as_deref(), Some("missing required 'token' field"));

    let response = dispatch_command(&request("send", Some("tok"), None), &supervisor).await;
    assert_eq!(
        response.error.as_deref(),
        Some("missing required 'message' field")
    );
}

#[tokio::test]
async fn unknown_command_is_rejected() {
    let world = FakeWorld::new();
    let supervisor = fake_supervisor(&world, test_config());

    let response = dispatch_command(&request("restart", None, None), &supervisor).await;
    assert!(!response.ok);
    assert_eq!(response.error.as_deref(), Some("unknown command: restart"));
}

#[test]
fn request_lines_deserialize_with_optional_fields() {
    let parsed: IpcRequest = serde_json::from_str(r#"{"command":"list"}"#).unwrap();
    assert_eq!(parsed, request("list", None, None));
}
