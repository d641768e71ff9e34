use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use linecast_frame::{Message, DELIMITER};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    kind: &'a str,
    payload: &'a serde_json::Value,
    peer: &'a str,
    timestamp: String,
}

/// Print one received message. `body` is the frame as read off the socket,
/// without its delimiter; only [`OutputFormat::Raw`] uses it.
pub fn print_message(message: &Message, body: &[u8], peer: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                kind: &message.kind,
                payload: &message.payload,
                peer,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "PEER", "PAYLOAD"])
                .add_row(vec![
                    message.kind.clone(),
                    peer.to_string(),
                    message.payload.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let payload = serde_json::to_string_pretty(&message.payload)
                .unwrap_or_else(|_| message.payload.to_string());
            println!("kind={} peer={} payload={}", message.kind, peer, payload);
        }
        OutputFormat::Raw => {
            let mut line = Vec::with_capacity(body.len() + 1);
            line.extend_from_slice(body);
            line.push(DELIMITER);
            print_raw(&line);
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
