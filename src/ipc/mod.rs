//! Local IPC layer for `bot-supervisor-ctl` interaction.
//!
//! Provides a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! server that accepts JSON-line commands from the companion CLI.

pub mod server;

pub use server::{dispatch_command, spawn_ipc_server, IpcRequest, IpcResponse};
