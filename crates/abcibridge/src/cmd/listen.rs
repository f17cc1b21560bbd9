use abcibridge_transport::TcpServerChannel;
use tracing::info;

use crate::cmd::{interrupted, ListenArgs};
use crate::exit::{channel_error, CliResult, SUCCESS};
use crate::output::{print_envelope, Direction, OutputFormat};

pub async fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let channel = TcpServerChannel::new(args.channel.config());
    let local_addr = channel
        .connect()
        .await
        .map_err(|err| channel_error("listen failed", err))?;
    info!(%local_addr, "waiting for requests");

    let mut printed = 0usize;
    loop {
        let envelope = tokio::select! {
            () = interrupted() => break,
            envelope = channel.get_message() => envelope,
        };
        let Some(envelope) = envelope else {
            break;
        };

        print_envelope(&envelope, Direction::Request, format);
        printed = printed.saturating_add(1);

        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    channel
        .disconnect()
        .await
        .map_err(|err| channel_error("shutdown failed", err))?;
    Ok(SUCCESS)
}
