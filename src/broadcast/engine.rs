//! Fan-out of one message to every consumer

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::stats::RelayStats;

/// Default bound on a single enqueue
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of one broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Consumers the message was addressed to
    pub targets: usize,
    /// Consumers whose queue accepted the message
    pub delivered: usize,
    /// Consumers removed because the send failed or timed out
    pub dropped: Vec<ConnectionId>,
}

/// Sends messages to all registered consumers concurrently
///
/// The send set is snapshotted from the registry, so consumers joining during
/// a broadcast simply miss it. A consumer whose queue stays full for longer
/// than the send timeout, or whose writer has already gone away, is
/// unregistered once every send has settled.
#[derive(Clone)]
pub struct BroadcastEngine {
    registry: Arc<ConnectionRegistry>,
    stats: Arc<RelayStats>,
    send_timeout: Duration,
}

impl BroadcastEngine {
    pub fn new(registry: Arc<ConnectionRegistry>, stats: Arc<RelayStats>) -> Self {
        Self {
            registry,
            stats,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Set the per-consumer send timeout
    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Deliver `message` to every consumer other than `excluding`
    pub async fn broadcast(
        &self,
        message: Message,
        excluding: Option<ConnectionId>,
    ) -> BroadcastReport {
        let targets = self.registry.consumer_targets(excluding).await;
        if targets.is_empty() {
            return BroadcastReport::default();
        }

        let send_timeout = self.send_timeout;
        let sends = targets.iter().map(|(id, tx)| {
            let message = message.clone();
            async move {
                match timeout(send_timeout, tx.send(message)).await {
                    Ok(Ok(())) => None,
                    Ok(Err(_)) => {
                        tracing::warn!(conn = %id, "Consumer queue closed, dropping");
                        Some(*id)
                    }
                    Err(_) => {
                        tracing::warn!(
                            conn = %id,
                            timeout_ms = send_timeout.as_millis() as u64,
                            "Consumer send timed out, dropping"
                        );
                        Some(*id)
                    }
                }
            }
        });

        let dropped: Vec<ConnectionId> = join_all(sends).await.into_iter().flatten().collect();

        for id in &dropped {
            self.registry.unregister(*id).await;
        }

        let report = BroadcastReport {
            targets: targets.len(),
            delivered: targets.len() - dropped.len(),
            dropped,
        };

        self.stats.record_delivered(report.delivered);
        if !report.dropped.is_empty() {
            self.stats.record_consumers_dropped(report.dropped.len());
        }

        report
    }
}
