use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use abcibridge_frame::{read_all, AbciCodec, FrameError};
use bytes::{Bytes, BytesMut};
use futures_util::SinkExt;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::{ChannelConfig, PeerPolicy};
use crate::envelope::Envelope;
use crate::error::{ChannelError, Result};
use crate::queue::{queue, QueueReceiver, QueueSender};

const READ_BUFFER_CAPACITY: usize = 8 * 1024;
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelState {
    Idle,
    Listening,
    Stopped,
}

struct ActivePeer {
    connection_id: u64,
    peer_addr: SocketAddr,
    cancel: CancellationToken,
}

struct ActiveWriter {
    connection_id: u64,
    sink: FramedWrite<OwnedWriteHalf, AbciCodec>,
    cancel: CancellationToken,
}

struct Inner {
    config: ChannelConfig,
    state: Mutex<ChannelState>,
    cancel: CancellationToken,
    queue_tx: QueueSender,
    queue_rx: tokio::sync::Mutex<QueueReceiver>,
    active: Mutex<Option<ActivePeer>>,
    // FIFO mutex: concurrent `send` calls hit the wire in the order they lock.
    writer: tokio::sync::Mutex<Option<ActiveWriter>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
    next_connection_id: AtomicU64,
}

/// TCP server end of an ABCI conversation.
///
/// Accepts one peer at a time, decodes its byte stream into [`Envelope`]s in
/// arrival order, and writes responses back in `send` call order. Cloning is
/// cheap; all clones share the same listener, queue and peer.
#[derive(Clone)]
pub struct TcpServerChannel {
    inner: Arc<Inner>,
}

impl TcpServerChannel {
    /// Create a stopped channel.
    pub fn new(config: ChannelConfig) -> Self {
        let (queue_tx, queue_rx) = queue(config.queue_capacity);
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(ChannelState::Idle),
                cancel: CancellationToken::new(),
                queue_tx,
                queue_rx: tokio::sync::Mutex::new(queue_rx),
                active: Mutex::new(None),
                writer: tokio::sync::Mutex::new(None),
                accept_task: Mutex::new(None),
                local_addr: Mutex::new(None),
                next_connection_id: AtomicU64::new(1),
            }),
        }
    }

    /// Bind the listener and start accepting in the background.
    ///
    /// Returns the bound address once listening; it does not wait for a peer.
    pub async fn connect(&self) -> Result<SocketAddr> {
        {
            let mut state = lock(&self.inner.state);
            match *state {
                ChannelState::Idle => *state = ChannelState::Listening,
                ChannelState::Listening => return Err(ChannelError::AlreadyListening),
                ChannelState::Stopped => return Err(ChannelError::Terminated),
            }
        }

        let addr = &self.inner.config.listen_addr;
        let bound = match TcpListener::bind(addr).await {
            Ok(listener) => listener.local_addr().map(|local| (listener, local)),
            Err(err) => Err(err),
        };
        let (listener, local_addr) = match bound {
            Ok(bound) => bound,
            Err(source) => {
                let mut state = lock(&self.inner.state);
                if *state == ChannelState::Listening {
                    *state = ChannelState::Idle;
                }
                return Err(ChannelError::Bind {
                    addr: addr.clone(),
                    source,
                });
            }
        };

        *lock(&self.inner.local_addr) = Some(local_addr);
        info!(%local_addr, target = %self.inner.config.target, "abci channel listening");

        let handle = tokio::spawn(accept_loop(Arc::clone(&self.inner), listener));
        *lock(&self.inner.accept_task) = Some(handle);
        Ok(local_addr)
    }

    /// Wait for the next request.
    ///
    /// Returns `None` when the channel is not listening, including while a
    /// `disconnect` is in progress.
    pub async fn get_message(&self) -> Option<Envelope> {
        if self.is_stopped() {
            return None;
        }

        let rx = tokio::select! {
            biased;
            () = self.inner.cancel.cancelled() => None,
            rx = self.inner.queue_rx.lock() => Some(rx),
        };
        let Some(mut rx) = rx else {
            return None;
        };

        tokio::select! {
            biased;
            () = self.inner.cancel.cancelled() => None,
            envelope = rx.pop() => envelope,
        }
    }

    /// Frame and write a response to the connected peer.
    pub async fn send(&self, envelope: Envelope) -> Result<()> {
        let mut writer = self.inner.writer.lock().await;
        let Some(active) = writer.as_mut() else {
            return Err(ChannelError::NotConnected);
        };

        if let Some(requested) = envelope.connection_id {
            if requested != active.connection_id {
                return Err(ChannelError::StaleConnection {
                    requested,
                    active: active.connection_id,
                });
            }
        }

        let connection_id = active.connection_id;
        let kind = envelope.kind;
        let cancel = active.cancel.clone();
        let sent = tokio::select! {
            () = cancel.cancelled() => None,
            sent = active.sink.send(envelope.body) => Some(sent),
        };

        match sent {
            Some(sent) => {
                sent?;
                trace!(connection_id, %kind, "response written");
                Ok(())
            }
            None => {
                // A partially written frame leaves the sink unusable.
                *writer = None;
                debug!(connection_id, %kind, "write abandoned, peer closed");
                Err(ChannelError::NotConnected)
            }
        }
    }

    /// Stop accepting, close the peer and discard queued requests.
    ///
    /// Calling this more than once is a no-op.
    pub async fn disconnect(&self) -> Result<()> {
        {
            let mut state = lock(&self.inner.state);
            let was_listening = *state == ChannelState::Listening;
            *state = ChannelState::Stopped;
            if !was_listening {
                return Ok(());
            }
        }

        // Cancelling first releases the writer lock from any stalled `send`.
        self.inner.cancel.cancel();

        let mut first_error = None;
        if let Some(mut active) = self.inner.writer.lock().await.take() {
            match tokio::time::timeout(CLOSE_TIMEOUT, close_sink(&mut active.sink)).await {
                Ok(Ok(())) => debug!(connection_id = active.connection_id, "peer stream flushed"),
                Ok(Err(err)) => {
                    warn!(connection_id = active.connection_id, %err, "failed to flush peer stream");
                    first_error = Some(ChannelError::from(err));
                }
                Err(_) => warn!(
                    connection_id = active.connection_id,
                    "timed out flushing peer stream"
                ),
            }
        }

        let accept_task = lock(&self.inner.accept_task).take();
        if let Some(handle) = accept_task {
            if let Err(err) = handle.await {
                warn!(%err, "accept loop ended abnormally");
            }
        }
        *lock(&self.inner.active) = None;

        let discarded = self.inner.queue_rx.lock().await.close_and_drain();
        info!(discarded, "abci channel stopped");

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// True unless the channel is listening.
    pub fn is_stopped(&self) -> bool {
        *lock(&self.inner.state) != ChannelState::Listening
    }

    /// True while a peer connection is active.
    pub fn has_peer(&self) -> bool {
        lock(&self.inner.active).is_some()
    }

    /// Address of the active peer, if any.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        lock(&self.inner.active).as_ref().map(|peer| peer.peer_addr)
    }

    /// Bound listener address after a successful `connect`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.inner.local_addr)
    }

    /// Channel configuration.
    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for TcpServerChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpServerChannel")
            .field("listen_addr", &self.inner.config.listen_addr)
            .field("state", &*lock(&self.inner.state))
            .finish()
    }
}

impl Inner {
    /// Register a new peer according to the configured policy.
    ///
    /// Returns `None` if the peer must be turned away.
    fn admit_peer(&self, peer_addr: SocketAddr) -> Option<(u64, CancellationToken)> {
        let mut active = lock(&self.active);
        if let Some(current) = active.as_ref() {
            match self.config.peer_policy {
                PeerPolicy::Reject => {
                    warn!(
                        %peer_addr,
                        active_peer = %current.peer_addr,
                        "rejecting peer: a connection is already active"
                    );
                    return None;
                }
                PeerPolicy::Replace => {
                    info!(
                        %peer_addr,
                        replaced_peer = %current.peer_addr,
                        connection_id = current.connection_id,
                        "replacing active peer"
                    );
                    current.cancel.cancel();
                }
            }
        }

        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.cancel.child_token();
        *active = Some(ActivePeer {
            connection_id,
            peer_addr,
            cancel: cancel.clone(),
        });
        Some((connection_id, cancel))
    }

    async fn install_writer(
        &self,
        connection_id: u64,
        stream: OwnedWriteHalf,
        cancel: CancellationToken,
    ) {
        let codec = AbciCodec::with_max_message_size(self.config.max_message_size);
        *self.writer.lock().await = Some(ActiveWriter {
            connection_id,
            sink: FramedWrite::new(stream, codec),
            cancel,
        });
    }

    async fn release_peer(&self, connection_id: u64) {
        {
            let mut active = lock(&self.active);
            if active
                .as_ref()
                .is_some_and(|peer| peer.connection_id == connection_id)
            {
                *active = None;
            }
        }

        let mut writer = self.writer.lock().await;
        if writer
            .as_ref()
            .is_some_and(|active| active.connection_id == connection_id)
        {
            if let Some(mut active) = writer.take() {
                let _ = tokio::time::timeout(CLOSE_TIMEOUT, close_sink(&mut active.sink)).await;
            }
        }
    }
}

async fn accept_loop(inner: Arc<Inner>, listener: TcpListener) {
    let mut connections = JoinSet::new();

    loop {
        let accepted = tokio::select! {
            () = inner.cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        while connections.try_join_next().is_some() {}

        let (stream, peer_addr) = match accepted {
            Ok(pair) => pair,
            Err(err) => {
                warn!(%err, "failed to accept connection");
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                continue;
            }
        };

        if let Err(err) = stream.set_nodelay(true) {
            debug!(%peer_addr, %err, "failed to set TCP_NODELAY");
        }

        let Some((connection_id, cancel)) = inner.admit_peer(peer_addr) else {
            continue;
        };
        info!(%peer_addr, connection_id, "peer connected");

        let (read_half, write_half) = stream.into_split();
        inner
            .install_writer(connection_id, write_half, cancel.clone())
            .await;
        connections.spawn(read_loop(
            Arc::clone(&inner),
            connection_id,
            read_half,
            cancel,
        ));
    }

    while connections.join_next().await.is_some() {}
    debug!("accept loop stopped");
}

enum ConnectionEnd {
    Cancelled,
    Eof { pending: usize },
    Io(std::io::Error),
    Malformed(FrameError),
}

async fn read_loop(
    inner: Arc<Inner>,
    connection_id: u64,
    mut stream: OwnedReadHalf,
    cancel: CancellationToken,
) {
    let max_message_size = inner.config.max_message_size;
    let mut buf = BytesMut::with_capacity(READ_BUFFER_CAPACITY);

    let end = 'conn: loop {
        let read = tokio::select! {
            () = cancel.cancelled() => break 'conn ConnectionEnd::Cancelled,
            read = stream.read_buf(&mut buf) => read,
        };
        match read {
            Ok(0) => break 'conn ConnectionEnd::Eof { pending: buf.len() },
            Ok(n) => trace!(connection_id, bytes = n, "read from peer"),
            Err(err) => break 'conn ConnectionEnd::Io(err),
        }

        for decoded in read_all(&mut buf, max_message_size) {
            let body = match decoded {
                Ok(body) => body,
                Err(err) => break 'conn ConnectionEnd::Malformed(err),
            };
            let envelope = Envelope::request(connection_id, inner.config.target.as_str(), body);
            debug!(connection_id, kind = %envelope.kind, size = envelope.body.len(), "request decoded");

            let queued = tokio::select! {
                () = cancel.cancelled() => false,
                queued = inner.queue_tx.push(envelope) => queued,
            };
            if !queued {
                break 'conn ConnectionEnd::Cancelled;
            }
        }
    };

    match end {
        ConnectionEnd::Cancelled => debug!(connection_id, "connection closed by server"),
        ConnectionEnd::Eof { pending: 0 } => info!(connection_id, "peer disconnected"),
        ConnectionEnd::Eof { pending } => {
            warn!(connection_id, pending, "peer disconnected mid-message")
        }
        ConnectionEnd::Io(err) => warn!(connection_id, %err, "peer connection failed"),
        ConnectionEnd::Malformed(err) => {
            warn!(connection_id, %err, "malformed frame, closing connection")
        }
    }

    inner.release_peer(connection_id).await;
}

async fn close_sink(
    sink: &mut FramedWrite<OwnedWriteHalf, AbciCodec>,
) -> std::result::Result<(), FrameError> {
    SinkExt::<Bytes>::close(sink).await
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use abcibridge_frame::{encode_varint, frame_message, MessageKind};
    use bytes::Bytes;
    use futures_util::StreamExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio_util::codec::FramedRead;

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    fn test_config() -> ChannelConfig {
        ChannelConfig::default().with_listen_addr("127.0.0.1:0")
    }

    async fn started(config: ChannelConfig) -> (TcpServerChannel, SocketAddr) {
        let channel = TcpServerChannel::new(config);
        let addr = channel.connect().await.expect("channel should bind");
        (channel, addr)
    }

    async fn next_message(channel: &TcpServerChannel) -> Envelope {
        tokio::time::timeout(WAIT, channel.get_message())
            .await
            .expect("request should arrive")
            .expect("channel should be open")
    }

    async fn expect_closed(stream: &mut TcpStream) {
        let mut scratch = [0u8; 64];
        let read = tokio::time::timeout(WAIT, stream.read(&mut scratch))
            .await
            .expect("server should close the stream");
        assert!(matches!(read, Ok(0) | Err(_)), "stream should be closed");
    }

    fn request(field_kind: MessageKind, payload: &[u8]) -> Bytes {
        field_kind.wrap_request(payload).expect("request kind")
    }

    #[tokio::test]
    async fn lifecycle_states() {
        let channel = TcpServerChannel::new(test_config());
        assert!(channel.is_stopped());

        let addr = channel.connect().await.unwrap();
        assert!(!channel.is_stopped());
        assert_eq!(channel.local_addr(), Some(addr));
        assert!(matches!(
            channel.connect().await,
            Err(ChannelError::AlreadyListening)
        ));

        channel.disconnect().await.unwrap();
        assert!(channel.is_stopped());
        channel.disconnect().await.unwrap();

        assert!(matches!(channel.connect().await, Err(ChannelError::Terminated)));
        assert!(channel.get_message().await.is_none());
    }

    #[tokio::test]
    async fn bind_failure_leaves_channel_idle() {
        let (occupied, addr) = started(test_config()).await;
        let channel = TcpServerChannel::new(ChannelConfig::default().with_listen_addr(addr.to_string()));

        assert!(matches!(
            channel.connect().await,
            Err(ChannelError::Bind { .. })
        ));
        assert!(channel.is_stopped());

        occupied.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn requests_arrive_in_wire_order_across_odd_chunks() {
        let (channel, addr) = started(test_config().with_target("counter")).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        let mut wire = Vec::new();
        for n in 0..20u8 {
            wire.extend_from_slice(&frame_message(&request(MessageKind::DeliverTx, &vec![n; n as usize * 13])));
        }
        for chunk in wire.chunks(7) {
            client.write_all(chunk).await.unwrap();
            client.flush().await.unwrap();
        }

        for n in 0..20u8 {
            let envelope = next_message(&channel).await;
            assert_eq!(envelope.kind, MessageKind::DeliverTx);
            assert_eq!(envelope.target, "counter");
            assert_eq!(
                abcibridge_frame::inner_message(&envelope.body).unwrap(),
                vec![n; n as usize * 13].as_slice()
            );
        }

        channel.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn responses_written_in_call_order() {
        let (channel, addr) = started(test_config()).await;
        let client = TcpStream::connect(addr).await.unwrap();
        let (client_read, mut client_write) = client.into_split();

        client_write
            .write_all(&frame_message(&request(MessageKind::Flush, &[])))
            .await
            .unwrap();
        let flush = next_message(&channel).await;
        assert_eq!(flush.kind, MessageKind::Flush);

        for n in 0..10u8 {
            channel
                .send(flush.reply(MessageKind::Query.wrap_response(&[n]).unwrap()))
                .await
                .unwrap();
        }

        let mut responses = FramedRead::new(client_read, AbciCodec::new());
        for n in 0..10u8 {
            let body = tokio::time::timeout(WAIT, responses.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            assert_eq!(MessageKind::of_response(&body), MessageKind::Query);
            assert_eq!(abcibridge_frame::inner_message(&body).unwrap(), &[n]);
        }

        channel.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn send_without_peer_is_not_connected() {
        let channel = TcpServerChannel::new(test_config());
        let err = channel.send(Envelope::response(vec![0x1a, 0x00])).await;
        assert!(matches!(err, Err(ChannelError::NotConnected)));

        channel.connect().await.unwrap();
        let err = channel.send(Envelope::response(vec![0x1a, 0x00])).await;
        assert!(matches!(err, Err(ChannelError::NotConnected)));
        channel.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn disconnect_unblocks_pending_get_message() {
        let (channel, _addr) = started(test_config()).await;

        let waiter = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.get_message().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        channel.disconnect().await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be released")
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn disconnect_aborts_send_to_peer_that_stopped_reading() {
        let (channel, addr) = started(test_config()).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(&frame_message(&request(MessageKind::Flush, &[])))
            .await
            .unwrap();
        let flush = next_message(&channel).await;

        let stalled = {
            let channel = channel.clone();
            let reply = flush.reply(Bytes::from(vec![0u8; 64 << 20]));
            tokio::spawn(async move { channel.send(reply).await })
        };
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!stalled.is_finished(), "client never reads, send should block");

        tokio::time::timeout(Duration::from_secs(3), channel.disconnect())
            .await
            .expect("disconnect should not wait behind a blocked send")
            .unwrap();
        let sent = tokio::time::timeout(WAIT, stalled).await.unwrap().unwrap();
        assert!(matches!(sent, Err(ChannelError::NotConnected)));
        drop(client);
    }

    #[tokio::test]
    async fn disconnect_discards_queued_requests_and_closes_peer() {
        let (channel, addr) = started(test_config()).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(&frame_message(&request(MessageKind::Info, &[])))
            .await
            .unwrap();

        tokio::time::timeout(WAIT, async {
            while !channel.has_peer() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        channel.disconnect().await.unwrap();
        assert!(channel.get_message().await.is_none());
        expect_closed(&mut client).await;
    }

    #[tokio::test]
    async fn malformed_frame_closes_only_that_connection() {
        let (channel, addr) = started(test_config().with_max_message_size(16)).await;

        let mut bad = TcpStream::connect(addr).await.unwrap();
        let mut prefix = BytesMut::new();
        encode_varint(1024, &mut prefix);
        bad.write_all(&prefix).await.unwrap();
        expect_closed(&mut bad).await;

        let mut good = TcpStream::connect(addr).await.unwrap();
        good.write_all(&frame_message(&request(MessageKind::Echo, b"hi")))
            .await
            .unwrap();
        let envelope = next_message(&channel).await;
        assert_eq!(envelope.kind, MessageKind::Echo);

        channel.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn reject_policy_turns_away_second_peer() {
        let (channel, addr) = started(test_config().with_peer_policy(PeerPolicy::Reject)).await;

        let mut first = TcpStream::connect(addr).await.unwrap();
        first
            .write_all(&frame_message(&request(MessageKind::Info, &[])))
            .await
            .unwrap();
        let from_first = next_message(&channel).await;

        let mut second = TcpStream::connect(addr).await.unwrap();
        expect_closed(&mut second).await;

        first
            .write_all(&frame_message(&request(MessageKind::Commit, &[])))
            .await
            .unwrap();
        let again = next_message(&channel).await;
        assert_eq!(again.connection_id, from_first.connection_id);
        assert_eq!(again.kind, MessageKind::Commit);

        channel.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn replace_policy_hands_over_to_new_peer() {
        let (channel, addr) = started(test_config()).await;

        let mut first = TcpStream::connect(addr).await.unwrap();
        first
            .write_all(&frame_message(&request(MessageKind::Info, &[])))
            .await
            .unwrap();
        let old = next_message(&channel).await;

        let mut second = TcpStream::connect(addr).await.unwrap();
        expect_closed(&mut first).await;

        second
            .write_all(&frame_message(&request(MessageKind::Info, &[])))
            .await
            .unwrap();
        let new = next_message(&channel).await;
        assert_ne!(new.connection_id, old.connection_id);

        let stale = channel
            .send(old.reply(MessageKind::Info.wrap_response(&[]).unwrap()))
            .await;
        assert!(matches!(stale, Err(ChannelError::StaleConnection { .. })));

        channel
            .send(new.reply(MessageKind::Info.wrap_response(&[]).unwrap()))
            .await
            .unwrap();
        let mut responses = FramedRead::new(second, AbciCodec::new());
        let body = tokio::time::timeout(WAIT, responses.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(MessageKind::of_response(&body), MessageKind::Info);

        channel.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn bounded_queue_preserves_order_under_backpressure() {
        let (channel, addr) = started(test_config().with_queue_capacity(1)).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        let mut wire = Vec::new();
        for n in 0..8u8 {
            wire.extend_from_slice(&frame_message(&request(MessageKind::CheckTx, &[n])));
        }
        client.write_all(&wire).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        for n in 0..8u8 {
            let envelope = next_message(&channel).await;
            assert_eq!(abcibridge_frame::inner_message(&envelope.body).unwrap(), &[n]);
        }

        channel.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn peer_reconnect_after_close() {
        let (channel, addr) = started(test_config()).await;

        let first = TcpStream::connect(addr).await.unwrap();
        drop(first);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut second = TcpStream::connect(addr).await.unwrap();
        second
            .write_all(&frame_message(&request(MessageKind::Echo, b"again")))
            .await
            .unwrap();
        let envelope = next_message(&channel).await;
        assert_eq!(envelope.kind, MessageKind::Echo);
        assert!(channel.peer_addr().is_some());

        channel.disconnect().await.unwrap();
    }
}
