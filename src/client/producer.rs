//! Producer side of the hub protocol
//!
//! A separately running capture process connects as the producer and pushes
//! JPEG frames and detection events.

use std::time::Duration;

use bytes::Bytes;
use futures_util::SinkExt;
use tokio_tungstenite::tungstenite::Message;

use crate::error::Result;
use crate::protocol::{detection_message, DetectionEvent, Role};

use super::connector::{connect_as, ClientStream, DEFAULT_REPLY_TIMEOUT};

/// Connection holding the hub's producer slot
///
/// # Example
/// ```no_run
/// use bytes::Bytes;
/// use homecam_relay::client::RelayProducer;
///
/// # async fn example(jpeg: Bytes) -> homecam_relay::error::Result<()> {
/// let mut producer = RelayProducer::connect("ws://127.0.0.1:8765").await?;
/// producer.send_frame(jpeg).await?;
/// producer.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct RelayProducer {
    ws: ClientStream,
}

impl RelayProducer {
    /// Connect and claim the producer slot
    ///
    /// Fails with [`crate::Error::Rejected`] if another producer holds the
    /// slot or this host is not local to the hub.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_timeout(url, DEFAULT_REPLY_TIMEOUT).await
    }

    pub async fn connect_with_timeout(url: &str, reply_timeout: Duration) -> Result<Self> {
        let (ws, _) = connect_as(url, Role::Producer, reply_timeout).await?;
        Ok(Self { ws })
    }

    /// Send one encoded image as a binary message
    pub async fn send_frame(&mut self, frame: Bytes) -> Result<()> {
        self.ws.send(Message::binary(frame)).await?;
        Ok(())
    }

    /// Send a detection event in the JSON envelope
    pub async fn send_detection(&mut self, event: &DetectionEvent) -> Result<()> {
        let message = detection_message(event)?;
        self.ws.send(message).await?;
        Ok(())
    }

    /// Send a pre-encoded message unchanged
    pub async fn send_message(&mut self, message: Message) -> Result<()> {
        self.ws.send(message).await?;
        Ok(())
    }

    /// Close the connection, releasing the producer slot
    pub async fn close(mut self) -> Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}
