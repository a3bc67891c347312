#![forbid(unsafe_code)]

//! `bot-supervisor`: supervises one worker process per bot token and talks
//! to each over a strict request/reply channel.

pub mod channel;
pub mod config;
pub mod errors;
pub mod http;
pub mod ipc;
pub mod process;
pub mod supervisor;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
pub use supervisor::{Supervisor, WorkerInfo, WorkerState};
