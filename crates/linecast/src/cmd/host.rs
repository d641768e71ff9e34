use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use linecast_frame::Message;
use linecast_session::{Connection, Host, SessionConfig, SessionError};
use tracing::{debug, warn};

use crate::cmd::{decode_frame, HostArgs};
use crate::exit::{session_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: HostArgs, format: OutputFormat) -> CliResult<i32> {
    let config = SessionConfig {
        port: args.port,
        bind_addr: args.bind,
        ..SessionConfig::default()
    };
    let host = Host::bind(&config).map_err(|err| session_error("host failed", err))?;
    eprintln!("hosting as {} on {}", host.hostname(), host.local_addr());

    install_ctrlc_handler(host.clone())?;

    let received = Arc::new(AtomicUsize::new(0));
    let handler = {
        let host = host.clone();
        move |connection: Connection| serve_peer(&host, connection, &args, &received, format)
    };

    match host.accept_loop(handler) {
        Err(SessionError::RegistryClosed) => Ok(SUCCESS),
        Err(err) => Err(session_error("accept failed", err)),
        Ok(never) => match never {},
    }
}

fn serve_peer(
    host: &Host,
    mut connection: Connection,
    args: &HostArgs,
    received: &AtomicUsize,
    format: OutputFormat,
) {
    let id = connection.id();
    let peer = id.to_string();

    loop {
        let (message, body) = match connection.recv_frame().and_then(decode_frame) {
            Ok(received) => received,
            Err(err) if err.is_frame_local() => {
                warn!(%id, error = %err, "dropped corrupt frame");
                continue;
            }
            Err(err) => {
                if !err.is_disconnect() {
                    warn!(%id, error = %err, "peer read failed");
                }
                break;
            }
        };

        print_message(&message, &body, &peer, format);
        if args.relay {
            relay(host, &message);
        }

        let total = received.fetch_add(1, Ordering::SeqCst) + 1;
        if args.count.is_some_and(|count| total >= count) {
            host.stop();
            break;
        }
    }

    if host.remove_peer(id) {
        debug!(%id, "peer disconnected");
    }
}

fn relay(host: &Host, message: &Message) {
    match host.broadcast(&message.kind, &message.payload) {
        Ok(delivered) => debug!(kind = %message.kind, delivered, "relayed message"),
        Err(err) => warn!(error = %err, "relay failed"),
    }
}

fn install_ctrlc_handler(host: Host) -> CliResult<()> {
    ctrlc::set_handler(move || host.stop())
        .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
