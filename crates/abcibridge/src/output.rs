use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use abcibridge_transport::Envelope;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
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

/// Whether an envelope travelled from the node or back to it.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Request,
    Response,
}

#[derive(Serialize)]
struct EnvelopeOutput<'a> {
    direction: Direction,
    kind: String,
    connection_id: Option<u64>,
    target: &'a str,
    size: usize,
    body_hex: String,
    timestamp: String,
}

pub fn print_envelope(envelope: &Envelope, direction: Direction, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = EnvelopeOutput {
                direction,
                kind: envelope.kind.to_string(),
                connection_id: envelope.connection_id,
                target: &envelope.target,
                size: envelope.body.len(),
                body_hex: hex::encode(&envelope.body),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "CONNECTION", "SIZE", "BODY"])
                .add_row(vec![
                    envelope.kind.to_string(),
                    connection_label(envelope.connection_id),
                    envelope.body.len().to_string(),
                    body_preview(&envelope.body),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{direction:?} kind={} connection={} size={} body={}",
                envelope.kind,
                connection_label(envelope.connection_id),
                envelope.body.len(),
                body_preview(&envelope.body)
            );
        }
        OutputFormat::Raw => print_raw(&envelope.body),
    }
}

/// Print a serializable result as JSON or as key/value rows.
pub fn print_record<T: Serialize>(record: &T, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => print_json(record),
        OutputFormat::Table | OutputFormat::Pretty => {
            let value = serde_json::to_value(record).unwrap_or(serde_json::Value::Null);
            let Some(fields) = value.as_object() else {
                println!("{value}");
                return;
            };
            if matches!(format, OutputFormat::Pretty) {
                for (key, value) in fields {
                    println!("{key}: {}", plain(value));
                }
                return;
            }
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (key, value) in fields {
                table.add_row(vec![key.clone(), plain(value)]);
            }
            println!("{table}");
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn plain(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

fn connection_label(connection_id: Option<u64>) -> String {
    connection_id.map_or_else(|| "-".to_string(), |id| id.to_string())
}

/// Hex preview of a protobuf body, cut short for large messages.
fn body_preview(body: &[u8]) -> String {
    const PREVIEW_BYTES: usize = 32;
    if body.len() <= PREVIEW_BYTES {
        hex::encode(body)
    } else {
        format!(
            "{}... ({} bytes)",
            hex::encode(&body[..PREVIEW_BYTES]),
            body.len()
        )
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_preview_truncates_long_bodies() {
        assert_eq!(body_preview(&[0x12, 0x00]), "1200");
        let preview = body_preview(&[0xab; 40]);
        assert!(preview.ends_with("... (40 bytes)"));
        assert!(preview.starts_with(&"ab".repeat(32)));
    }

    #[test]
    fn plain_values_drop_quotes() {
        assert_eq!(plain(&serde_json::json!("x")), "x");
        assert_eq!(plain(&serde_json::Value::Null), "-");
        assert_eq!(plain(&serde_json::json!(3)), "3");
    }
}
