//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all supervisor failure modes.
///
/// Every variant maps to a stable snake_case code via [`AppError::kind`];
/// control-plane adapters expose that code to their callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// A worker is already registered (or starting) for the token.
    AlreadyRunning(String),
    /// No worker is registered for the token.
    NotFound(String),
    /// The worker process has exited.
    NotRunning(String),
    /// The OS refused to launch the worker executable.
    Spawn(String),
    /// The reply channel could not be bound.
    Bind(String),
    /// The worker did not complete the readiness handshake in time.
    StartupTimeout(String),
    /// The first frame from the worker was not the readiness token.
    UnexpectedFirstMessage(String),
    /// Receive/send alternation on a reply endpoint was violated.
    OutOfOrder(String),
    /// Transport failure while sending a frame.
    Send(String),
    /// Transport failure while receiving a frame.
    Recv(String),
    /// Delivering a termination signal failed at the OS level.
    Signal(String),
    /// A caller-supplied deadline elapsed mid-exchange.
    Timeout(String),
    /// The worker was marked unusable and must be stopped.
    Faulted(String),
    /// A start was revoked by a concurrent stop or shutdown.
    Cancelled(String),
    /// The supervisor no longer accepts new workers.
    ShuttingDown(String),
    /// The payload handed to the supervisor is malformed or empty.
    InvalidPayload(String),
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Local IPC communication failure.
    Ipc(String),
    /// HTTP control plane failure.
    Http(String),
}

impl AppError {
    /// Stable, machine-readable code for this error.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AlreadyRunning(_) => "already_running",
            Self::NotFound(_) => "not_found",
            Self::NotRunning(_) => "not_running",
            Self::Spawn(_) => "spawn",
            Self::Bind(_) => "bind",
            Self::StartupTimeout(_) => "startup_timeout",
            Self::UnexpectedFirstMessage(_) => "unexpected_first_message",
            Self::OutOfOrder(_) => "out_of_order",
            Self::Send(_) => "send",
            Self::Recv(_) => "recv",
            Self::Signal(_) => "signal",
            Self::Timeout(_) => "timeout",
            Self::Faulted(_) => "faulted",
            Self::Cancelled(_) => "cancelled",
            Self::ShuttingDown(_) => "shutting_down",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Ipc(_) => "ipc",
            Self::Http(_) => "http",
        }
    }

    /// Whether this failure leaves a worker's endpoint in an unknown state.
    ///
    /// Such workers are faulted and must be stopped explicitly.
    #[must_use]
    pub fn faults_worker(&self) -> bool {
        matches!(
            self,
            Self::OutOfOrder(_) | Self::Send(_) | Self::Recv(_) | Self::Timeout(_)
        )
    }

    fn message(&self) -> &str {
        match self {
            Self::AlreadyRunning(msg)
            | Self::NotFound(msg)
            | Self::NotRunning(msg)
            | Self::Spawn(msg)
            | Self::Bind(msg)
            | Self::StartupTimeout(msg)
            | Self::UnexpectedFirstMessage(msg)
            | Self::OutOfOrder(msg)
            | Self::Send(msg)
            | Self::Recv(msg)
            | Self::Signal(msg)
            | Self::Timeout(msg)
            | Self::Faulted(msg)
            | Self::Cancelled(msg)
            | Self::ShuttingDown(msg)
            | Self::InvalidPayload(msg)
            | Self::Config(msg)
            | Self::Io(msg)
            | Self::Ipc(msg)
            | Self::Http(msg) => msg,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::AlreadyRunning(_) => "already running",
            Self::NotFound(_) => "not found",
            Self::NotRunning(_) => "not running",
            Self::Spawn(_) => "spawn",
            Self::Bind(_) => "bind",
            Self::StartupTimeout(_) => "startup timeout",
            Self::UnexpectedFirstMessage(_) => "unexpected first message",
            Self::OutOfOrder(_) => "out of order",
            Self::Send(_) => "send",
            Self::Recv(_) => "recv",
            Self::Signal(_) => "signal",
            Self::Timeout(_) => "timeout",
            Self::Faulted(_) => "faulted",
            Self::Cancelled(_) => "cancelled",
            Self::ShuttingDown(_) => "shutting down",
            Self::InvalidPayload(_) => "invalid payload",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Ipc(_) => "ipc",
            Self::Http(_) => "http",
        };
        write!(f, "{label}: {}", self.message())
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
