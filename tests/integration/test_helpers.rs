//! Helpers shared by integration tests.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use bot_supervisor::config::GlobalConfig;
use bot_supervisor::http::serve_http_on;
use bot_supervisor::Supervisor;

/// Name unique to this test process and `test`, for sockets in the shared
/// local-socket namespace.
pub fn unique_name(test: &str) -> String {
    format!("bst-{}-{test}", std::process::id())
}

/// Serve `supervisor` over HTTP on an ephemeral port.
///
/// Caller must cancel the returned token to shut the server down.
pub async fn spawn_http(supervisor: Supervisor) -> (String, CancellationToken) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral");
    let port = listener.local_addr().expect("local addr").port();

    let ct = CancellationToken::new();
    let server_ct = ct.clone();
    tokio::spawn(async move {
        let _ = serve_http_on(listener, supervisor, server_ct).await;
    });

    (format!("http://127.0.0.1:{port}"), ct)
}

/// Config spawning the real `bot-worker-stub` binary in `mode`.
pub fn stub_config(test: &str, mode: &str, record: Option<&std::path::Path>) -> GlobalConfig {
    let mut config = GlobalConfig::with_executable(env!("CARGO_BIN_EXE_bot-worker-stub"));
    config.channel_prefix = unique_name(test);
    config.timeouts.startup_seconds = 5;
    config.timeouts.send_seconds = 5;
    config.timeouts.kill_grace_seconds = 1;
    config.worker_env.insert("STUB_MODE".into(), mode.into());
    if let Some(path) = record {
        config
            .worker_env
            .insert("STUB_RECORD".into(), path.display().to_string());
    }
    config
}

/// Supervisor spawning the real `bot-worker-stub` binary in `mode`.
pub fn stub_supervisor(test: &str, mode: &str, record: Option<&std::path::Path>) -> Supervisor {
    Supervisor::with_defaults(Arc::new(stub_config(test, mode, record)))
}

/// Poll `path` until it holds at least `count` lines.
pub async fn wait_for_lines(path: &std::path::Path, count: usize) -> Vec<String> {
    for _ in 0..300 {
        if let Ok(text) = tokio::fs::read_to_string(path).await {
            let lines: Vec<String> = text.lines().map(str::to_owned).collect();
            if lines.len() >= count {
                return lines;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    tokio::fs::read_to_string(path)
        .await
        .unwrap_or_default()
        .lines()
        .map(str::to_owned)
        .collect()
}
