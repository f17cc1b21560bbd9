use abcibridge_frame::{encoded_len, frame_message, varint_to_vec};
use serde::Serialize;

use crate::cmd::FrameArgs;
use crate::exit::{CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_raw, print_record, OutputFormat};

#[derive(Debug, Serialize)]
struct FrameOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    body_len: usize,
    prefix_len: usize,
    prefix_hex: String,
    frame_hex: String,
}

#[derive(Debug, Serialize)]
struct VarintOutput {
    value: u64,
    len: usize,
    hex: String,
}

pub fn run(args: FrameArgs, format: OutputFormat) -> CliResult<i32> {
    if let Some(value) = args.varint {
        let encoded = varint_to_vec(value);
        if matches!(format, OutputFormat::Raw) {
            print_raw(&encoded);
        } else {
            print_record(
                &VarintOutput {
                    value,
                    len: encoded.len(),
                    hex: hex::encode(&encoded),
                },
                format,
            );
        }
        return Ok(SUCCESS);
    }

    let payload = args.payload.resolve()?;
    let body = match args.kind {
        Some(kind) => kind
            .wrap_request(&payload)
            .ok_or_else(|| CliError::new(USAGE, format!("{kind} is not a request kind")))?
            .to_vec(),
        None => payload,
    };

    let framed = frame_message(&body);
    if matches!(format, OutputFormat::Raw) {
        print_raw(&framed);
        return Ok(SUCCESS);
    }

    let prefix_len = encoded_len(body.len() as u64);
    print_record(
        &FrameOutput {
            kind: args.kind.map(|kind| kind.to_string()),
            body_len: body.len(),
            prefix_len,
            prefix_hex: hex::encode(&framed[..prefix_len]),
            frame_hex: hex::encode(&framed),
        },
        format,
    );
    Ok(SUCCESS)
}
