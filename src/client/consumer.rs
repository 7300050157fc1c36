//! Consumer side of the hub protocol

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use crate::error::Result;
use crate::protocol::{classify, Inbound, Role};

use super::connector::{connect_as, ClientStream, DEFAULT_REPLY_TIMEOUT};

/// Receiving end of the hub's broadcast
pub struct RelayConsumer {
    ws: ClientStream,
}

impl RelayConsumer {
    /// Connect and join the broadcast set
    ///
    /// The hub's current state (frame, detection, sensor reading) follows
    /// as the first messages.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_timeout(url, DEFAULT_REPLY_TIMEOUT).await
    }

    pub async fn connect_with_timeout(url: &str, reply_timeout: Duration) -> Result<Self> {
        let (ws, _) = connect_as(url, Role::Consumer, reply_timeout).await?;
        Ok(Self { ws })
    }

    /// Next text or binary message; `None` once the hub closes
    pub async fn next_message(&mut self) -> Result<Option<Message>> {
        while let Some(message) = self.ws.next().await {
            match message? {
                Message::Close(_) => return Ok(None),
                message @ (Message::Text(_) | Message::Binary(_)) => return Ok(Some(message)),
                _ => {}
            }
        }
        Ok(None)
    }

    /// Next message, classified the way the hub classifies producer input
    pub async fn next_inbound(&mut self) -> Result<Option<Inbound>> {
        Ok(self.next_message().await?.map(|m| classify(&m)))
    }

    /// Send a control message; the hub only logs these
    pub async fn send_control(&mut self, json: &serde_json::Value) -> Result<()> {
        self.ws.send(Message::text(json.to_string())).await?;
        Ok(())
    }

    pub async fn close(mut self) -> Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}
