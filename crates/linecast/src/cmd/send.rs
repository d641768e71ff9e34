use linecast_session::{Session, SessionConfig};
use serde_json::Value;
use tracing::warn;

use crate::cmd::{decode_frame, parse_duration, SendArgs};
use crate::exit::{session_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::{print_message, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    if args.kind.is_empty() {
        return Err(CliError::new(USAGE, "--kind must not be empty"));
    }

    let mut config = SessionConfig {
        port: args.port,
        connect_timeout: parse_duration(&args.connect_timeout)?,
        ..SessionConfig::default()
    };
    if args.wait {
        config.frame.read_timeout = Some(parse_duration(&args.wait_timeout)?);
    }

    let mut session = Session::new(config);
    session
        .connect(&args.hostname)
        .map_err(|err| session_error("connect failed", err))?;
    session
        .send(&args.kind, &payload)
        .map_err(|err| session_error("send failed", err))?;

    if args.wait {
        let client = session
            .as_client_mut()
            .ok_or_else(|| CliError::new(INTERNAL, "session is not connected"))?;
        let (reply, body) = loop {
            match client.recv_frame().and_then(decode_frame) {
                Ok(received) => break received,
                Err(err) if err.is_frame_local() => warn!(error = %err, "dropped corrupt frame"),
                Err(err) => return Err(session_error("receive failed", err)),
            }
        };
        print_message(&reply, &body, client.hostname(), format);
    }

    session.stop();
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Value> {
    if let Some(json) = &args.json {
        return serde_json::from_str(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")));
    }
    if let Some(data) = &args.data {
        return Ok(Value::String(data.clone()));
    }
    Ok(Value::Null)
}
