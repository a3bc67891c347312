//! Global configuration parsing and validation.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Configurable timeout values (seconds) for worker lifecycle operations.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Upper bound on the readiness handshake.
    #[serde(default = "default_startup_seconds")]
    pub startup_seconds: u64,
    /// Default deadline for one send round trip.
    #[serde(default = "default_send_seconds")]
    pub send_seconds: u64,
    /// Grace period between SIGTERM and SIGKILL for a stopped process group.
    #[serde(default = "default_kill_grace_seconds")]
    pub kill_grace_seconds: u64,
    /// Interval between exit-monitor polls.
    #[serde(default = "default_monitor_interval_seconds")]
    pub monitor_interval_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            startup_seconds: default_startup_seconds(),
            send_seconds: default_send_seconds(),
            kill_grace_seconds: default_kill_grace_seconds(),
            monitor_interval_seconds: default_monitor_interval_seconds(),
        }
    }
}

impl TimeoutConfig {
    /// Readiness handshake bound.
    #[must_use]
    pub fn startup(&self) -> Duration {
        Duration::from_secs(self.startup_seconds)
    }

    /// Default send deadline.
    #[must_use]
    pub fn send(&self) -> Duration {
        Duration::from_secs(self.send_seconds)
    }

    /// SIGTERM → SIGKILL grace period.
    #[must_use]
    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_seconds)
    }

    /// Exit-monitor poll interval.
    #[must_use]
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_seconds)
    }
}

fn default_startup_seconds() -> u64 {
    30
}

fn default_send_seconds() -> u64 {
    10
}

fn default_kill_grace_seconds() -> u64 {
    5
}

fn default_monitor_interval_seconds() -> u64 {
    5
}

fn default_http_port() -> u16 {
    2030
}

fn default_http_bind() -> String {
    "127.0.0.1".into()
}

fn default_ipc_name() -> String {
    "bot-supervisor".into()
}

fn default_channel_prefix() -> String {
    "bot-supervisor".into()
}

fn default_base_port() -> u32 {
    5555
}

fn default_intents() -> String {
    "3243773".into()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Worker binary launched once per bot.
    pub worker_executable: PathBuf,
    /// Arguments placed before the token/address/payload arguments.
    #[serde(default)]
    pub worker_args: Vec<String>,
    /// HTTP control plane port.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// HTTP control plane bind address.
    #[serde(default = "default_http_bind")]
    pub http_bind: String,
    /// Named pipe / Unix socket identifier for `bot-supervisor-ctl`.
    #[serde(default = "default_ipc_name")]
    pub ipc_name: String,
    /// Prefix of every per-worker channel address.
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,
    /// First identifier handed out when deriving channel addresses.
    #[serde(default = "default_base_port")]
    pub base_port: u32,
    /// Gateway intents passed to workers when the caller gives none.
    #[serde(default = "default_intents")]
    pub default_intents: String,
    /// Extra environment variables set on every worker.
    #[serde(default)]
    pub worker_env: HashMap<String, String>,
    /// Worker lifecycle timeouts.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl GlobalConfig {
    /// Build a configuration with defaults for everything but the executable.
    #[must_use]
    pub fn with_executable(worker_executable: impl Into<PathBuf>) -> Self {
        Self {
            worker_executable: worker_executable.into(),
            worker_args: Vec::new(),
            http_port: default_http_port(),
            http_bind: default_http_bind(),
            ipc_name: default_ipc_name(),
            channel_prefix: default_channel_prefix(),
            base_port: default_base_port(),
            default_intents: default_intents(),
            worker_env: HashMap::new(),
            timeouts: TimeoutConfig::default(),
        }
    }

    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde defaults cannot express.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.worker_executable.as_os_str().is_empty() {
            return Err(AppError::Config(
                "worker_executable must not be empty".into(),
            ));
        }

        if self.timeouts.startup_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.startup_seconds must be greater than zero".into(),
            ));
        }

        if self.timeouts.send_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.send_seconds must be greater than zero".into(),
            ));
        }

        if self.timeouts.monitor_interval_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.monitor_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.channel_prefix.is_empty()
            || self.channel_prefix.contains(['/', '\\'])
        {
            return Err(AppError::Config(format!(
                "channel_prefix '{}' must be non-empty and contain no path separators",
                self.channel_prefix
            )));
        }

        Ok(())
    }
}
