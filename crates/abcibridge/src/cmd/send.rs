use std::net::TcpStream;

use abcibridge_frame::{FrameConfig, MessageKind, MessageReader, MessageWriter};
use abcibridge_transport::Envelope;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{frame_error, io_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_envelope, Direction, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let body = request_body(args.payload.resolve()?, args.kind)?;
    let config = FrameConfig {
        max_message_size: args.max_message_size,
        read_timeout: Some(wait_timeout),
        write_timeout: Some(wait_timeout),
    };

    let stream = TcpStream::connect(&args.addr)
        .map_err(|err| io_error(&format!("connect to {} failed", args.addr), err))?;
    let read_half = stream
        .try_clone()
        .map_err(|err| io_error("socket setup failed", err))?;

    let mut writer = MessageWriter::with_config_tcp(stream, config.clone())
        .map_err(|err| frame_error("socket setup failed", err))?;
    writer
        .send(&body)
        .map_err(|err| frame_error("send failed", err))?;

    if args.wait {
        let mut reader = MessageReader::with_config_tcp(read_half, config)
            .map_err(|err| frame_error("socket setup failed", err))?;
        let response = reader
            .read_message()
            .map_err(|err| frame_error("receive failed", err))?;
        print_envelope(&Envelope::response(response), Direction::Response, format);
    }

    Ok(SUCCESS)
}

fn request_body(payload: Vec<u8>, kind: Option<MessageKind>) -> CliResult<Vec<u8>> {
    match kind {
        None if payload.is_empty() => Err(CliError::new(
            USAGE,
            "nothing to send: pass --kind, --data, --hex or --file",
        )),
        None => Ok(payload),
        Some(kind) => kind
            .wrap_request(&payload)
            .map(|body| body.to_vec())
            .ok_or_else(|| CliError::new(USAGE, format!("{kind} is not a request kind"))),
    }
}
