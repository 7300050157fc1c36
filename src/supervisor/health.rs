//! Periodic liveness reporting

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::registry::ConnectionRegistry;
use crate::source::{AdapterState, SourceHandle, SourceKind};
use crate::stats::{RelayStats, StatsSnapshot};

/// Default interval between status lines
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(60);

/// One status line's worth of data
#[derive(Debug, Clone, PartialEq)]
pub struct HealthStatus {
    pub consumers: usize,
    pub producer_connected: bool,
    pub sources: Vec<(SourceKind, AdapterState)>,
    pub stats: StatsSnapshot,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "consumers={} producer={}",
            self.consumers,
            if self.producer_connected { "yes" } else { "no" }
        )?;
        for (kind, state) in &self.sources {
            write!(f, " {}={}", kind, state.as_str())?;
        }
        Ok(())
    }
}

/// Logs a status line at a fixed interval
///
/// Read-only: it never touches the data path.
pub struct HealthSupervisor {
    registry: Arc<ConnectionRegistry>,
    stats: Arc<RelayStats>,
    sources: Vec<SourceHandle>,
    interval: Duration,
}

impl HealthSupervisor {
    pub fn new(registry: Arc<ConnectionRegistry>, stats: Arc<RelayStats>) -> Self {
        Self {
            registry,
            stats,
            sources: Vec::new(),
            interval: DEFAULT_HEALTH_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_sources(mut self, sources: Vec<SourceHandle>) -> Self {
        self.sources = sources;
        self
    }

    pub async fn status(&self) -> HealthStatus {
        let registry = self.registry.status().await;
        HealthStatus {
            consumers: registry.consumers,
            producer_connected: registry.producer.is_some(),
            sources: self.sources.iter().map(|s| (s.kind, s.state())).collect(),
            stats: self.stats.snapshot(),
        }
    }

    /// Emit a status line every interval until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let status = self.status().await;
                    tracing::info!(
                        consumers = status.consumers,
                        producer = status.producer_connected,
                        frames = status.stats.frames_ingested,
                        fps = status.stats.frame_rate(),
                        detections = status.stats.detections_ingested,
                        dropped = status.stats.consumers_dropped,
                        "Health: {}",
                        status
                    );
                }
            }
        }

        tracing::debug!("Health supervisor stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use tokio::sync::mpsc;

    use super::*;
    use crate::registry::{ConnectionId, ConnectionInfo, Registration};

    #[tokio::test]
    async fn test_status_reflects_registry() {
        let registry = Arc::new(ConnectionRegistry::new());
        let supervisor = HealthSupervisor::new(Arc::clone(&registry), Arc::new(RelayStats::new()));

        let status = supervisor.status().await;
        assert_eq!(status.consumers, 0);
        assert!(!status.producer_connected);
        assert_eq!(status.to_string(), "consumers=0 producer=no");

        let local: SocketAddr = "127.0.0.1:45000".parse().unwrap();
        let (tx, _rx) = mpsc::channel(1);
        registry
            .register(ConnectionInfo::new(ConnectionId(1), local), Registration::Producer)
            .await
            .unwrap();
        registry
            .register(
                ConnectionInfo::new(ConnectionId(2), local),
                Registration::Consumer { outbound: tx },
            )
            .await
            .unwrap();

        let status = supervisor.status().await;
        assert_eq!(status.consumers, 1);
        assert!(status.producer_connected);
        assert_eq!(status.to_string(), "consumers=1 producer=yes");
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let supervisor = HealthSupervisor::new(
            Arc::new(ConnectionRegistry::new()),
            Arc::new(RelayStats::new()),
        )
        .with_interval(Duration::from_millis(5));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(supervisor.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
