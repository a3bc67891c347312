#![forbid(unsafe_code)]

//! `bot-supervisor-ctl`: local CLI companion for `bot-supervisor`.
//!
//! Connects to the IPC socket and sends JSON commands to the supervisor.

use std::io::{BufRead, BufReader, Write};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};

use bot_supervisor::ipc::{IpcRequest, IpcResponse};

#[derive(Debug, Parser)]
#[command(
    name = "bot-supervisor-ctl",
    about = "Local CLI for the bot-supervisor server",
    version,
    long_about = None
)]
struct Cli {
    /// IPC socket name (must match the server's `ipc_name` config).
    #[arg(long, default_value = "bot-supervisor")]
    ipc_name: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List running and starting workers.
    List,

    /// Stop the worker serving a token.
    Stop {
        /// Bot token.
        token: String,
    },

    /// Deliver a message to the worker serving a token.
    Send {
        /// Bot token.
        token: String,
        /// Message text, usually a JSON object.
        message: String,
    },
}

fn main() -> ExitCode {
    let args = Cli::parse();
    let request = args.command.into_request();

    match send_ipc_command(&args.ipc_name, &request) {
        Ok(response) => report(&response),
        Err(err) => {
            eprintln!("Failed to connect to server: {err}");
            eprintln!("Is bot-supervisor running with ipc_name '{}'?", args.ipc_name);
            ExitCode::FAILURE
        }
    }
}

impl Command {
    fn into_request(self) -> IpcRequest {
        let (command, token, message) = match self {
            Self::List => ("list", None, None),
            Self::Stop { token } => ("stop", Some(token), None),
            Self::Send { token, message } => ("send", Some(token), Some(message)),
        };
        IpcRequest {
            command: command.to_owned(),
            token,
            message,
        }
    }
}

/// Print a server response; failures go to stderr.
fn report(response: &IpcResponse) -> ExitCode {
    if !response.ok {
        eprintln!(
            "Error: {}",
            response.error.as_deref().unwrap_or("unknown error")
        );
        return ExitCode::FAILURE;
    }
    match &response.data {
        Some(data) => println!(
            "{}",
            serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())
        ),
        None => println!("OK"),
    }
    ExitCode::SUCCESS
}

/// Send one command over the IPC socket and decode the reply line.
fn send_ipc_command(
    ipc_name: &str,
    request: &IpcRequest,
) -> std::result::Result<IpcResponse, Box<dyn std::error::Error>> {
    let name = ipc_name.to_ns_name::<GenericNamespaced>()?;
    let mut stream = Stream::connect(name)?;

    let mut request_line = serde_json::to_string(request)?;
    request_line.push('\n');
    stream.write_all(request_line.as_bytes())?;
    stream.flush()?;

    let mut response_line = String::new();
    BufReader::new(&stream).read_line(&mut response_line)?;
    if response_line.trim().is_empty() {
        return Err("server closed the connection without replying".into());
    }

    Ok(serde_json::from_str(response_line.trim())?)
}
