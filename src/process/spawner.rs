//! Worker process spawner.
//!
//! Spawns one worker process per bot with:
//! - its own process group, so termination reaches any children it forks;
//! - `env_clear()` plus a safe allowlist, so the supervisor's secrets never
//!   leak into the worker beyond the variables set explicitly;
//! - stdout/stderr piped and forwarded line by line into the log;
//! - `kill_on_drop(true)` as a last line of defence.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::{LaunchSpec, ProcessLauncher, WorkerProcess};
use crate::{AppError, Result};

/// Environment variables inherited by every worker process.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    "LANG",
    "TZ",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

/// Variable carrying the bot token into the worker.
pub const TOKEN_ENV: &str = "BOT_TOKEN";

/// Variable carrying the reply channel address into the worker.
pub const CHANNEL_ENV: &str = "BOT_CHANNEL";

/// Production [`ProcessLauncher`] built on `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessSpawner;

impl ProcessLauncher for ProcessSpawner {
    fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn WorkerProcess>> {
        let mut cmd = Command::new(&spec.executable);
        cmd.args(&spec.args);

        cmd.env_clear();
        for &key in ALLOWED_ENV_VARS {
            if let Ok(val) = std::env::var(key) {
                cmd.env(key, val);
            }
        }
        for (key, val) in &spec.env {
            cmd.env(key, val);
        }
        cmd.env(TOKEN_ENV, &spec.token)
            .env(CHANNEL_ENV, spec.channel.as_str());

        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|err| {
            AppError::Spawn(format!(
                "failed to spawn '{}': {err}",
                spec.executable.display()
            ))
        })?;

        if let Some(stdout) = child.stdout.take() {
            forward_output(stdout, spec.label.clone(), "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(stderr, spec.label.clone(), "stderr");
        }

        let pid = child.id();
        info!(
            token = %spec.label,
            pid = pid.unwrap_or(0),
            channel = %spec.channel,
            "worker process spawned"
        );

        Ok(Box::new(ProcessHandle {
            child,
            pid,
            label: spec.label.clone(),
            exited: None,
        }))
    }
}

/// A spawned worker process that leads its own process group.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
    label: String,
    exited: Option<String>,
}

impl WorkerProcess for ProcessHandle {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    fn exit_status(&mut self) -> Option<String> {
        if let Some(ref status) = self.exited {
            return Some(status.clone());
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                let text = describe_exit(status);
                self.exited = Some(text.clone());
                Some(text)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(token = %self.label, %err, "failed to poll worker process status");
                let text = format!("ended with unknown status ({err})");
                self.exited = Some(text.clone());
                Some(text)
            }
        }
    }

    fn terminate_group(&mut self) -> Result<()> {
        let exited = self.exit_status();
        let Some(pid) = self.pid else {
            return Err(AppError::NotRunning("worker process has no pid".into()));
        };

        // The leader may be gone while forked children still hold the group.
        #[cfg(unix)]
        {
            signal_group(pid, nix::sys::signal::Signal::SIGTERM).map_err(|err| {
                match (err, exited.as_deref()) {
                    (AppError::NotRunning(_), Some(status)) => {
                        AppError::NotRunning(format!("worker process {status}"))
                    }
                    (other, _) => other,
                }
            })?;
        }
        #[cfg(not(unix))]
        {
            if let Some(status) = exited.as_deref() {
                return Err(AppError::NotRunning(format!("worker process {status}")));
            }
            self.child
                .start_kill()
                .map_err(|err| AppError::Signal(format!("failed to kill process {pid}: {err}")))?;
        }

        if exited.is_some() {
            info!(token = %self.label, pid, "termination signal sent to orphaned worker group members");
        } else {
            info!(token = %self.label, pid, "termination signal sent to worker process group");
        }
        Ok(())
    }

    fn reap(self: Box<Self>, grace: Duration) {
        let Self {
            mut child,
            pid,
            label,
            ..
        } = *self;

        tokio::spawn(async move {
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(token = %label, status = %describe_exit(status), "worker process reaped");
                }
                Ok(Err(err)) => {
                    warn!(token = %label, %err, "error waiting for worker process");
                }
                Err(_) => {
                    warn!(
                        token = %label,
                        "worker did not exit within grace period, killing process group"
                    );
                    force_kill(&mut child, pid, &label).await;
                }
            }
        });
    }
}

/// Kill the group (or just the child off unix) and wait for the leader.
async fn force_kill(child: &mut Child, pid: Option<u32>, label: &str) {
    #[cfg(unix)]
    {
        if let Some(pid) = pid {
            match signal_group(pid, nix::sys::signal::Signal::SIGKILL) {
                Ok(()) | Err(AppError::NotRunning(_)) => {}
                Err(err) => warn!(token = %label, %err, "failed to kill worker process group"),
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    if let Err(err) = child.kill().await {
        debug!(token = %label, %err, "worker leader already gone");
    }
}

/// Deliver `signal` to the process group led by `pid`.
#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let raw = i32::try_from(pid)
        .map_err(|_| AppError::Signal(format!("pid {pid} does not fit a process group id")))?;

    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => Err(AppError::NotRunning(format!(
            "process group {pid} no longer exists"
        ))),
        Err(errno) => Err(AppError::Signal(format!(
            "failed to send {signal} to process group {pid}: {errno}"
        ))),
    }
}

/// Human-readable description of how a process ended.
fn describe_exit(status: ExitStatus) -> String {
    if status.success() {
        "exited normally (code 0)".to_owned()
    } else {
        status.code().map_or_else(
            || "terminated by signal".to_owned(),
            |code| format!("exited with code {code}"),
        )
    }
}

/// Forward every line of a worker output stream into the log.
fn forward_output<R>(reader: R, label: String, stream: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if stream == "stderr" => {
                    warn!(token = %label, stream, "{line}");
                }
                Ok(Some(line)) => {
                    info!(token = %label, stream, "{line}");
                }
                Ok(None) => break,
                Err(err) => {
                    debug!(token = %label, stream, %err, "worker output stream closed");
                    break;
                }
            }
        }
    });
}
