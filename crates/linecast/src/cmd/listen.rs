use linecast_session::{Client, SessionConfig};
use linecast_transport::NetStream;
use tracing::{debug, warn};

use crate::cmd::{decode_frame, parse_duration, ListenArgs};
use crate::exit::{session_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = SessionConfig {
        port: args.port,
        connect_timeout: parse_duration(&args.connect_timeout)?,
        ..SessionConfig::default()
    };
    let mut client = Client::connect(&args.hostname, &config)
        .map_err(|err| session_error("connect failed", err))?;

    let handle = client
        .shutdown_handle()
        .map_err(|err| session_error("connect failed", err))?;
    install_ctrlc_handler(handle)?;

    let peer = client.hostname().to_string();
    let mut printed = 0usize;

    loop {
        let (message, body) = match client.recv_frame().and_then(decode_frame) {
            Ok(received) => received,
            Err(err) if err.is_frame_local() => {
                warn!(error = %err, "dropped corrupt frame");
                continue;
            }
            Err(err) if err.is_disconnect() => {
                debug!("host closed the connection");
                return Ok(SUCCESS);
            }
            Err(err) => return Err(session_error("receive failed", err)),
        };

        print_message(&message, &body, &peer, format);
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                if let Err(err) = client.shutdown() {
                    debug!(error = %err, "client shutdown failed");
                }
                return Ok(SUCCESS);
            }
        }
    }
}

fn install_ctrlc_handler(handle: NetStream) -> CliResult<()> {
    ctrlc::set_handler(move || {
        if let Err(err) = handle.shutdown() {
            debug!(error = %err, "interrupt shutdown failed");
        }
    })
    .map_err(|err| {
        CliError::new(
            INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
