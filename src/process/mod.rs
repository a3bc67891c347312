//! Worker process handles.
//!
//! The supervisor only sees the [`WorkerProcess`] and [`ProcessLauncher`]
//! traits. How a process group is created and signalled is platform
//! specific and lives in [`spawner`]; tests plug in fakes.

pub mod spawner;

use std::path::PathBuf;
use std::time::Duration;

use crate::channel::ChannelAddress;
use crate::Result;

pub use spawner::{ProcessHandle, ProcessSpawner};

/// Everything needed to launch one worker.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Worker binary.
    pub executable: PathBuf,
    /// Full argument list, already ordered.
    pub args: Vec<String>,
    /// Explicit environment variables set on the child.
    pub env: Vec<(String, String)>,
    /// Bot token the worker serves.
    pub token: String,
    /// Reply channel the worker must connect to.
    pub channel: ChannelAddress,
    /// Redacted token used in log fields.
    pub label: String,
}

/// Ownership of one spawned worker process and its process group.
pub trait WorkerProcess: Send {
    /// OS process id, if the platform exposes one.
    fn id(&self) -> Option<u32>;

    /// Non-blocking exit probe; `Some` describes how the process ended.
    fn exit_status(&mut self) -> Option<String>;

    /// Whether the process is still running.
    fn is_alive(&mut self) -> bool {
        self.exit_status().is_none()
    }

    /// Ask the whole process group to terminate gracefully.
    ///
    /// # Errors
    ///
    /// - `AppError::NotRunning` if the process already exited and no member
    ///   of its group is left.
    /// - `AppError::Signal` if the OS refused to deliver the signal.
    fn terminate_group(&mut self) -> Result<()>;

    /// Hand the process to a background reaper that waits up to `grace` for
    /// it to exit and force-kills the group afterwards. Never blocks.
    fn reap(self: Box<Self>, grace: Duration);
}

impl std::fmt::Debug for dyn WorkerProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerProcess").field("pid", &self.id()).finish()
    }
}

/// Launches worker processes.
pub trait ProcessLauncher: Send + Sync {
    /// Spawn the worker described by `spec` as a new process-group leader.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the OS cannot start the executable.
    fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn WorkerProcess>>;
}
