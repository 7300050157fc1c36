//! Per-connection handling
//!
//! ```text
//!   TCP accept
//!       │
//!       ▼
//!   WebSocket upgrade ──► hello message ──► Role::from_hello
//!                                                │
//!                     ┌──────────────────────────┴───────────────┐
//!                     ▼                                          ▼
//!                 Producer                                   Consumer
//!     register ──► reply ──► read loop ──► ingest    register_with(reply + replay)
//!        │                                               │            │
//!        └─► rejected: error reply, wait for close    writer task   read loop
//!                                                    (outbound rx)  (control)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

use crate::cache::StateCache;
use crate::error::{Error, Result};
use crate::ingest::{Ingest, IngestSender};
use crate::protocol::{Reply, Role};
use crate::registry::{
    ConnectionId, ConnectionInfo, ConnectionRegistry, Registration, RegistryError,
};
use crate::server::config::HubConfig;
use crate::stats::RelayStats;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

/// Shared state every connection handler needs
#[derive(Clone)]
pub struct ConnectionContext {
    pub config: Arc<HubConfig>,
    pub registry: Arc<ConnectionRegistry>,
    pub cache: Arc<StateCache>,
    pub stats: Arc<RelayStats>,
    pub ingest: IngestSender,
    /// Fired in the last shutdown phase
    pub shutdown: CancellationToken,
}

/// One accepted TCP connection, from upgrade to close
pub struct Connection {
    id: ConnectionId,
    socket: TcpStream,
    peer_addr: SocketAddr,
    ctx: ConnectionContext,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        socket: TcpStream,
        peer_addr: SocketAddr,
        ctx: ConnectionContext,
    ) -> Self {
        Self {
            id,
            socket,
            peer_addr,
            ctx,
        }
    }

    /// Upgrade, read the hello, then serve the declared role
    pub async fn run(self) -> Result<()> {
        let Connection {
            id,
            socket,
            peer_addr,
            ctx,
        } = self;
        let handshake_timeout = ctx.config.handshake_timeout;

        let ws = timeout(handshake_timeout, tokio_tungstenite::accept_async(socket))
            .await
            .map_err(|_| Error::Handshake("WebSocket upgrade timed out".to_string()))??;
        let (sink, mut stream) = ws.split();

        let hello = match timeout(handshake_timeout, next_data(&mut stream)).await {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(None) => {
                tracing::debug!(conn = %id, "Closed before hello");
                return Ok(());
            }
            Err(_) => return Err(Error::Handshake("no hello message".to_string())),
        };

        let role = Role::from_hello(&hello);
        let info = ConnectionInfo::new(id, peer_addr);
        tracing::debug!(conn = %id, peer = %peer_addr, role = %role, "Hello received");

        match role {
            Role::Producer => run_producer(info, sink, stream, ctx).await,
            Role::Consumer => run_consumer(info, sink, stream, ctx).await,
        }
    }
}

async fn run_producer(
    info: ConnectionInfo,
    mut sink: WsSink,
    mut stream: WsStream,
    ctx: ConnectionContext,
) -> Result<()> {
    let id = info.id;
    let peer = info.peer_addr;
    let send_timeout = ctx.config.send_timeout;

    if let Err(e) = ctx.registry.register(info, Registration::Producer).await {
        ctx.stats.record_producer_rejected();
        match e {
            RegistryError::ProducerNotLocal => {
                tracing::warn!(conn = %id, peer = %peer, "Rejected non-local producer")
            }
            _ => tracing::debug!(conn = %id, peer = %peer, reason = %e, "Producer rejected"),
        }

        let reply = Reply::error(e.reply_message()).to_message();
        if let Ok(Ok(())) = timeout(send_timeout, sink.send(reply)).await {
            await_peer_close(&mut stream, ctx.config.reject_grace, &ctx.shutdown).await;
        }
        let _ = timeout(send_timeout, sink.close()).await;
        return Err(e.into());
    }

    let connected = Reply::connected(Role::Producer).to_message();
    if let Err(e) = send_within(&mut sink, connected, send_timeout).await {
        ctx.registry.unregister(id).await;
        return Err(e);
    }

    let result = producer_loop(id, &mut stream, &ctx).await;

    ctx.registry.unregister(id).await;
    let _ = timeout(send_timeout, sink.close()).await;
    tracing::info!(conn = %id, peer = %peer, "Producer disconnected");
    result
}

async fn producer_loop(
    id: ConnectionId,
    stream: &mut WsStream,
    ctx: &ConnectionContext,
) -> Result<()> {
    loop {
        let message = tokio::select! {
            _ = ctx.shutdown.cancelled() => return Ok(()),
            message = stream.next() => message,
        };

        match message {
            None | Some(Ok(Message::Close(_))) => return Ok(()),
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
            Some(Ok(message)) => {
                if ctx.ingest.send(Ingest::producer(id, message)).await.is_err() {
                    tracing::debug!(conn = %id, "Ingest closed, ending producer session");
                    return Ok(());
                }
            }
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

async fn run_consumer(
    info: ConnectionInfo,
    sink: WsSink,
    mut stream: WsStream,
    ctx: ConnectionContext,
) -> Result<()> {
    let id = info.id;
    let peer = info.peer_addr;
    let (outbound, rx) = mpsc::channel(ctx.config.outbound_queue);

    // The connect reply is queued ahead of the replay, and both ahead of any
    // broadcast, because registration and queueing share the registry lock.
    let cache = Arc::clone(&ctx.cache);
    ctx.registry
        .register_with(info, Registration::Consumer { outbound }, move || {
            let mut messages = vec![Reply::connected(Role::Consumer).to_message()];
            messages.extend(cache.replay_messages());
            messages
        })
        .await?;

    let mut writer = tokio::spawn(write_loop(id, sink, rx, ctx.config.send_timeout));
    let mut writer_done = false;

    let result = loop {
        tokio::select! {
            _ = &mut writer => {
                writer_done = true;
                break Ok(());
            }
            _ = ctx.shutdown.cancelled() => break Ok(()),
            message = stream.next() => match message {
                None | Some(Ok(Message::Close(_))) => break Ok(()),
                Some(Ok(Message::Text(text))) => log_control(id, text.as_str()),
                Some(Ok(Message::Binary(data))) => {
                    tracing::debug!(conn = %id, len = data.len(), "Ignoring binary from consumer");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(Error::from(e)),
            },
        }
    };

    // Unregistering drops the last sender, so the writer flushes and exits
    ctx.registry.unregister(id).await;
    if !writer_done && timeout(ctx.config.drain_timeout, &mut writer).await.is_err() {
        writer.abort();
    }

    tracing::info!(conn = %id, peer = %peer, "Consumer disconnected");
    result
}

/// Drain one consumer's queue onto its socket
///
/// Stops at the first failed or timed-out write. Dropping `rx` then makes the
/// next broadcast to this consumer fail, which unregisters it.
async fn write_loop(
    id: ConnectionId,
    mut sink: WsSink,
    mut rx: mpsc::Receiver<Message>,
    send_timeout: Duration,
) {
    while let Some(message) = rx.recv().await {
        if let Err(e) = send_within(&mut sink, message, send_timeout).await {
            tracing::debug!(conn = %id, error = %e, "Consumer write failed");
            rx.close();
            return;
        }
    }
    let _ = timeout(send_timeout, sink.close()).await;
}

async fn send_within(sink: &mut WsSink, message: Message, limit: Duration) -> Result<()> {
    match timeout(limit, sink.send(message)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "send timed out",
        ))),
    }
}

/// Consumer control messages are observed, never acted on
fn log_control(id: ConnectionId, text: &str) {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => tracing::debug!(conn = %id, message = %value, "Consumer control message"),
        Err(e) => tracing::warn!(conn = %id, error = %e, "Invalid consumer message"),
    }
}

/// Next text or binary message, skipping control frames
async fn next_data(
    stream: &mut WsStream,
) -> Option<std::result::Result<Message, tokio_tungstenite::tungstenite::Error>> {
    loop {
        match stream.next().await? {
            Ok(Message::Close(_)) => return None,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
            other => return Some(other),
        }
    }
}

/// Give a rejected peer time to close on its side
async fn await_peer_close(stream: &mut WsStream, grace: Duration, shutdown: &CancellationToken) {
    let closed = async {
        while let Some(Ok(message)) = stream.next().await {
            if message.is_close() {
                break;
            }
        }
    };

    tokio::select! {
        _ = shutdown.cancelled() => {}
        result = timeout(grace, closed) => {
            if result.is_err() {
                tracing::debug!("Rejected peer did not close within grace period");
            }
        }
    }
}
