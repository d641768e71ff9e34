use std::net::IpAddr;
use std::time::Duration;

use bytes::Bytes;
use clap::{Args, Subcommand};
use linecast_frame::{decode_message, Message};
use linecast_session::{SessionError, DEFAULT_PORT};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod host;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Host a session and print every message peers send.
    Host(HostArgs),
    /// Connect to a host and send a single message.
    Send(SendArgs),
    /// Connect to a host and print the messages it sends.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Decode a received frame body, keeping the body for raw output.
pub(crate) fn decode_frame(body: Bytes) -> Result<(Message, Bytes), SessionError> {
    let message = decode_message(&body)?;
    Ok((message, body))
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Host(args) => host::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct HostArgs {
    /// Address to bind. Default: the primary address of the local host name.
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<IpAddr>,
    /// Port to listen on.
    #[arg(long, short = 'p', env = "LINECAST_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Rebroadcast every received message to all peers.
    #[arg(long)]
    pub relay: bool,
    /// Stop hosting after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Host name (or address) of the host to connect to.
    pub hostname: String,
    /// Message kind.
    #[arg(long, short = 'k')]
    pub kind: String,
    /// JSON payload.
    #[arg(long, conflicts_with = "data")]
    pub json: Option<String>,
    /// String payload.
    #[arg(long, conflicts_with = "json")]
    pub data: Option<String>,
    /// Port the host listens on.
    #[arg(long, short = 'p', env = "LINECAST_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Wait for one message from the host and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for a reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    /// Connection timeout (e.g. 5s, 500ms).
    #[arg(long, env = "LINECAST_CONNECT_TIMEOUT", default_value = "5s")]
    pub connect_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Host name (or address) of the host to connect to.
    pub hostname: String,
    /// Port the host listens on.
    #[arg(long, short = 'p', env = "LINECAST_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Connection timeout (e.g. 5s, 500ms).
    #[arg(long, env = "LINECAST_CONNECT_TIMEOUT", default_value = "5s")]
    pub connect_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
