//! Shared connect-and-declare step for hub clients

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{Error, Result};
use crate::protocol::{Reply, Role};

/// Default time allowed for the hub's handshake reply
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connect to `url`, declare `role` and wait for the hub's reply
///
/// An error reply becomes [`Error::Rejected`] carrying the hub's message.
pub(crate) async fn connect_as(
    url: &str,
    role: Role,
    reply_timeout: Duration,
) -> Result<(ClientStream, Reply)> {
    let (mut ws, _) = timeout(reply_timeout, tokio_tungstenite::connect_async(url))
        .await
        .map_err(|_| Error::Handshake(format!("connect to {} timed out", url)))??;

    let hello = serde_json::json!({ "type": role.as_str() }).to_string();
    ws.send(Message::text(hello)).await?;

    let reply = timeout(reply_timeout, read_reply(&mut ws))
        .await
        .map_err(|_| Error::Handshake("no reply from hub".to_string()))??;

    if !reply.is_connected() {
        let _ = ws.close(None).await;
        return Err(Error::Rejected(reply.message));
    }

    tracing::debug!(url = %url, role = %role, "Connected to hub");
    Ok((ws, reply))
}

async fn read_reply(ws: &mut ClientStream) -> Result<Reply> {
    loop {
        match ws.next().await {
            Some(Ok(message)) => {
                if message.is_close() {
                    return Err(Error::Handshake("hub closed before replying".to_string()));
                }
                if let Some(reply) = Reply::from_message(&message) {
                    return Ok(reply);
                }
            }
            Some(Err(e)) => return Err(e.into()),
            None => return Err(Error::Handshake("hub closed before replying".to_string())),
        }
    }
}
