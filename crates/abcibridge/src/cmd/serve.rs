use abcibridge_connection::{Envelope, MessageKind, ServerConnection};
use abcibridge_frame::inner_message;
use tracing::{debug, info, warn};

use crate::cmd::{interrupted, ServeArgs};
use crate::exit::{connection_error, CliResult, SUCCESS};
use crate::output::{print_envelope, Direction, OutputFormat};

pub async fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let proxy_app = format!("tcp://{}", args.channel.addr);
    let connection = ServerConnection::from_config(
        args.node.params(&proxy_app),
        args.node.config()?,
        args.channel.config(),
    );

    let local_addr = connection
        .connect()
        .await
        .map_err(|err| connection_error("serve failed", err))?;
    info!(%local_addr, "serving");

    let served = serve(&connection, args.count, format).await;
    let stopped = connection
        .disconnect()
        .await
        .map_err(|err| connection_error("shutdown failed", err));
    served?;
    stopped?;
    Ok(SUCCESS)
}

async fn serve(
    connection: &ServerConnection,
    count: Option<usize>,
    format: OutputFormat,
) -> CliResult<()> {
    let mut printed = 0usize;
    loop {
        let request = tokio::select! {
            () = interrupted() => return Ok(()),
            request = connection.receive() => request,
        };
        let Some(request) = request else {
            return Ok(());
        };

        if let Some(response) = auto_response(&request) {
            debug!(kind = %request.kind, "answering transport request");
            if let Err(err) = connection.send(response).await {
                warn!(%err, "failed to answer request");
            }
            continue;
        }

        print_envelope(&request, Direction::Request, format);
        printed = printed.saturating_add(1);
        if count.is_some_and(|count| printed >= count) {
            return Ok(());
        }
    }
}

/// Replies for requests that need no application logic.
///
/// `ResponseEcho` mirrors `RequestEcho` field for field, so the echo inner
/// message is sent back unchanged.
fn auto_response(request: &Envelope) -> Option<Envelope> {
    let inner = match request.kind {
        MessageKind::Echo => inner_message(&request.body)?,
        MessageKind::Flush => &[],
        _ => return None,
    };
    let body = request.kind.wrap_response(inner)?;
    Some(request.reply(body))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn echo_is_mirrored() {
        let request = Envelope::request(1, "app", Bytes::from_static(b"\x0a\x07\x0a\x05hello"));
        let response = auto_response(&request).unwrap();
        assert_eq!(response.body.as_ref(), b"\x12\x07\x0a\x05hello");
        assert_eq!(response.kind, MessageKind::Echo);
        assert_eq!(response.connection_id, Some(1));
    }

    #[test]
    fn flush_gets_empty_response() {
        let request = Envelope::request(2, "app", Bytes::from_static(&[0x12, 0x00]));
        let response = auto_response(&request).unwrap();
        assert_eq!(response.body.as_ref(), &[0x1a, 0x00]);
    }

    #[test]
    fn application_requests_are_not_answered() {
        let request = Envelope::request(3, "app", Bytes::from_static(&[0x1a, 0x00]));
        assert_eq!(request.kind, MessageKind::Info);
        assert!(auto_response(&request).is_none());
    }
}
