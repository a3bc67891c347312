//! Unit tests for configuration parsing and validation.

use std::io::Write;
use std::time::Duration;

use bot_supervisor::config::GlobalConfig;
use bot_supervisor::AppError;

fn sample_toml() -> &'static str {
    r#"
worker_executable = "/opt/bots/discord-worker"
worker_args = ["--verbose"]
http_port = 8080
http_bind = "0.0.0.0"
ipc_name = "bots-ctl"
channel_prefix = "bots"
base_port = 7000
default_intents = "513"

[worker_env]
BOT_REGION = "eu"

[timeouts]
startup_seconds = 12
send_seconds = 3
kill_grace_seconds = 2
monitor_interval_seconds = 1
"#
}

#[test]
fn parses_full_config() {
    let config = GlobalConfig::from_toml_str(sample_toml()).expect("valid config");

    assert_eq!(
        config.worker_executable.to_str(),
        Some("/opt/bots/discord-worker")
    );
    assert_eq!(config.worker_args, vec!["--verbose".to_owned()]);
    assert_eq!(config.http_port, 8080);
    assert_eq!(config.http_bind, "0.0.0.0");
    assert_eq!(config.ipc_name, "bots-ctl");
    assert_eq!(config.channel_prefix, "bots");
    assert_eq!(config.base_port, 7000);
    assert_eq!(config.default_intents, "513");
    assert_eq!(config.worker_env.get("BOT_REGION").map(String::as_str), Some("eu"));
    assert_eq!(config.timeouts.startup(), Duration::from_secs(12));
    assert_eq!(config.timeouts.send(), Duration::from_secs(3));
    assert_eq!(config.timeouts.kill_grace(), Duration::from_secs(2));
    assert_eq!(config.timeouts.monitor_interval(), Duration::from_secs(1));
}

#[test]
fn minimal_config_uses_defaults() {
    let config = GlobalConfig::from_toml_str("worker_executable = \"bot\"").expect("valid config");

    assert!(config.worker_args.is_empty());
    assert_eq!(config.http_port, 2030);
    assert_eq!(config.http_bind, "127.0.0.1");
    assert_eq!(config.ipc_name, "bot-supervisor");
    assert_eq!(config.channel_prefix, "bot-supervisor");
    assert_eq!(config.base_port, 5555);
    assert_eq!(config.default_intents, "3243773");
    assert!(config.worker_env.is_empty());
    assert_eq!(config.timeouts.startup_seconds, 30);
    assert_eq!(config.timeouts.send_seconds, 10);
    assert_eq!(config.timeouts.kill_grace_seconds, 5);
    assert_eq!(config.timeouts.monitor_interval_seconds, 5);
}

#[test]
fn with_executable_matches_parsed_defaults() {
    let parsed = GlobalConfig::from_toml_str("worker_executable = \"bot\"").expect("valid config");
    assert_eq!(GlobalConfig::with_executable("bot"), parsed);
}

#[test]
fn missing_executable_is_rejected() {
    let err = GlobalConfig::from_toml_str("http_port = 1").unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn empty_executable_is_rejected() {
    let err = GlobalConfig::from_toml_str("worker_executable = \"\"").unwrap_err();
    assert!(err.to_string().contains("worker_executable"));
}

#[test]
fn zero_startup_timeout_is_rejected() {
    let raw = "worker_executable = \"bot\"\n[timeouts]\nstartup_seconds = 0\n";
    let err = GlobalConfig::from_toml_str(raw).unwrap_err();
    assert!(err.to_string().contains("startup_seconds"));
}

#[test]
fn zero_send_timeout_is_rejected() {
    let raw = "worker_executable = \"bot\"\n[timeouts]\nsend_seconds = 0\n";
    let err = GlobalConfig::from_toml_str(raw).unwrap_err();
    assert!(err.to_string().contains("send_seconds"));
}

#[test]
fn zero_monitor_interval_is_rejected() {
    let raw = "worker_executable = \"bot\"\n[timeouts]\nmonitor_interval_seconds = 0\n";
    let err = GlobalConfig::from_toml_str(raw).unwrap_err();
    assert!(err.to_string().contains("monitor_interval_seconds"));
}

#[test]
fn channel_prefix_with_separator_is_rejected() {
    let raw = "worker_executable = \"bot\"\nchannel_prefix = \"a/b\"\n";
    let err = GlobalConfig::from_toml_str(raw).unwrap_err();
    assert!(err.to_string().contains("channel_prefix"));

    let raw = "worker_executable = \"bot\"\nchannel_prefix = \"\"\n";
    assert!(GlobalConfig::from_toml_str(raw).is_err());
}

#[test]
fn loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(sample_toml().as_bytes()).expect("write");

    let config = GlobalConfig::load_from_path(file.path()).expect("load config");
    assert_eq!(config.channel_prefix, "bots");
}

#[test]
fn unreadable_file_is_a_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = GlobalConfig::load_from_path(dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
}
