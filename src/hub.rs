//! Hub wiring and ordered shutdown
//!
//! ```text
//!   CameraSource ─┐                                ┌─► Consumer writer
//!   SerialSource ─┼─► SourceAdapter ─┐             │
//!                 │                  ▼             ├─► Consumer writer
//!   Producer ─────┴──────────► ingest queue ──► Ingestor ──► BroadcastEngine
//!                                                 │                 │
//!                                           StateCache      ConnectionRegistry
//! ```
//!
//! Shutdown runs in dependency order: sources and health first (devices
//! released), then the accept loop, then the ingest drain, then hook tasks,
//! then every registered connection.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::broadcast::BroadcastEngine;
use crate::cache::StateCache;
use crate::collab::{CollaboratorClient, DetectionHooks, ImageArchive};
use crate::detect::{AutoCapture, Detector, DetectorBackend};
use crate::error::Result;
use crate::ingest::{Ingestor, SourceArbiter};
use crate::registry::ConnectionRegistry;
use crate::server::{bind_with_retry, ConnectionContext, HubConfig, RelayServer};
use crate::source::{CameraSource, SerialSource, SourceAdapter, SourceHandle};
use crate::stats::RelayStats;
use crate::supervisor::HealthSupervisor;

/// Entry point for starting a hub
pub struct Hub;

impl Hub {
    /// Bind the listener and start every task
    ///
    /// Nothing is spawned until the listener is bound, so a bind failure
    /// leaves no devices open.
    pub async fn start(config: HubConfig) -> Result<RunningHub> {
        let listener = bind_with_retry(&config).await?;
        let config = Arc::new(config);

        let registry = Arc::new(ConnectionRegistry::new());
        let cache = Arc::new(StateCache::new());
        let stats = Arc::new(RelayStats::new());

        let detector = local_detector(&config).await;
        let auto_capture = detector.is_some();
        let arbiter = Arc::new(SourceArbiter::new(auto_capture));

        let (ingest_tx, ingest_rx) = mpsc::channel(config.ingest_queue);

        let engine = BroadcastEngine::new(Arc::clone(&registry), Arc::clone(&stats))
            .with_send_timeout(config.send_timeout);

        let client = config
            .collaborator
            .clone()
            .map(CollaboratorClient::new)
            .transpose()?;
        let archive = config
            .save_detection_images
            .then(|| ImageArchive::new(config.capture_dir.clone()));
        let hooks =
            DetectionHooks::new(client, archive).with_min_interval(config.detector.interval);

        let mut ingestor = Ingestor::new(
            Arc::clone(&cache),
            engine,
            Arc::clone(&arbiter),
            Arc::clone(&stats),
        )
        .with_hooks(hooks)
        .with_drain_timeout(config.drain_timeout);

        if let Some(detector) = detector {
            let detector: Arc<dyn Detector> = Arc::new(detector);
            let auto = AutoCapture::new(detector, ingest_tx.clone(), config.detector.interval);
            tracing::info!(detector = auto.detector_name(), "Auto-capture enabled");
            ingestor = ingestor.with_auto_capture(auto);
        }

        let ingest_cancel = CancellationToken::new();
        let ingest_task = tokio::spawn(ingestor.run(ingest_rx, ingest_cancel.clone()));

        let background_cancel = CancellationToken::new();
        let mut background = Vec::new();
        let mut sources: Vec<SourceHandle> = Vec::new();

        if config.background_capture {
            let camera = CameraSource::new(config.camera.clone());
            let adapter =
                SourceAdapter::new(camera, ingest_tx.clone()).with_arbiter(Arc::clone(&arbiter));
            sources.push(adapter.handle());
            background.push(tokio::spawn(adapter.run(background_cancel.clone())));
        }

        if let Some(ref serial) = config.serial {
            let adapter = SourceAdapter::new(SerialSource::new(serial.clone()), ingest_tx.clone());
            sources.push(adapter.handle());
            background.push(tokio::spawn(adapter.run(background_cancel.clone())));
        }

        let health = HealthSupervisor::new(Arc::clone(&registry), Arc::clone(&stats))
            .with_interval(config.health_interval)
            .with_sources(sources.clone());
        background.push(tokio::spawn(health.run(background_cancel.clone())));

        let connections_cancel = CancellationToken::new();
        let ctx = ConnectionContext {
            config: Arc::clone(&config),
            registry: Arc::clone(&registry),
            cache: Arc::clone(&cache),
            stats: Arc::clone(&stats),
            ingest: ingest_tx,
            shutdown: connections_cancel.clone(),
        };
        let server = RelayServer::new(listener, ctx)?;
        let local_addr = server.local_addr();
        let connections = server.tasks();

        let accept_cancel = CancellationToken::new();
        let accept_shutdown = accept_cancel.clone();
        let accept_task = tokio::spawn(async move {
            server.run_until(accept_shutdown.cancelled_owned()).await
        });

        tracing::info!(
            addr = %local_addr,
            camera = config.background_capture,
            serial = config.serial.is_some(),
            auto_capture = auto_capture,
            collaborator = config.collaborator.is_some(),
            "Hub started"
        );

        Ok(RunningHub {
            local_addr,
            config,
            registry,
            cache,
            stats,
            arbiter,
            sources,
            background_cancel,
            background,
            accept_cancel,
            accept_task,
            ingest_cancel,
            ingest_task,
            connections_cancel,
            connections,
        })
    }
}

/// The detector auto-capture runs with, if it runs at all
///
/// Local detections only displace the producer's when a primary detector
/// answered the startup probe. With the passive fallback auto-capture stays
/// off and producer detections remain authoritative.
async fn local_detector(config: &HubConfig) -> Option<DetectorBackend> {
    if !config.auto_capture {
        return None;
    }
    if !config.background_capture {
        tracing::warn!("Auto-capture needs background capture, leaving it off");
        return None;
    }

    let backend = DetectorBackend::select(&config.detector).await;
    if !backend.is_primary() {
        tracing::warn!(
            detector = backend.name(),
            "No primary detector, leaving auto-capture off"
        );
        return None;
    }
    Some(backend)
}

/// A started hub; dropping it without [`RunningHub::shutdown`] leaves tasks running
pub struct RunningHub {
    local_addr: SocketAddr,
    config: Arc<HubConfig>,
    registry: Arc<ConnectionRegistry>,
    cache: Arc<StateCache>,
    stats: Arc<RelayStats>,
    arbiter: Arc<SourceArbiter>,
    sources: Vec<SourceHandle>,
    background_cancel: CancellationToken,
    background: Vec<JoinHandle<()>>,
    accept_cancel: CancellationToken,
    accept_task: JoinHandle<Result<()>>,
    ingest_cancel: CancellationToken,
    ingest_task: JoinHandle<Option<DetectionHooks>>,
    connections_cancel: CancellationToken,
    connections: TaskTracker,
}

impl RunningHub {
    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<StateCache> {
        &self.cache
    }

    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    pub fn arbiter(&self) -> &Arc<SourceArbiter> {
        &self.arbiter
    }

    /// Handles for the local sources that were started
    pub fn sources(&self) -> &[SourceHandle] {
        &self.sources
    }

    /// Wait for `signal`, then shut down
    pub async fn run_until<F>(self, signal: F)
    where
        F: Future<Output = ()>,
    {
        signal.await;
        self.shutdown().await;
    }

    /// Ordered shutdown, each phase bounded by the drain timeout
    pub async fn shutdown(self) {
        let limit = self.config.drain_timeout;
        tracing::info!("Shutting down hub");

        // Sources and health first so no device writes into a closing hub
        self.background_cancel.cancel();
        if tokio::time::timeout(limit, join_all(self.background))
            .await
            .is_err()
        {
            tracing::warn!("Sources did not stop within drain timeout");
        }
        tracing::info!("Sources stopped");

        self.accept_cancel.cancel();
        match self.accept_task.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Accept loop failed"),
            Err(e) => tracing::error!(error = %e, "Accept task panicked"),
            Ok(Ok(())) => {}
        }

        self.ingest_cancel.cancel();
        let hooks = match self.ingest_task.await {
            Ok(hooks) => hooks,
            Err(e) => {
                tracing::error!(error = %e, "Ingest task panicked");
                None
            }
        };
        if let Some(hooks) = hooks {
            hooks.drain(limit).await;
        }

        let closed = self.registry.close_all().await;
        self.connections_cancel.cancel();
        self.connections.close();
        if tokio::time::timeout(limit, self.connections.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                pending = self.connections.len(),
                "Connections still open after drain timeout"
            );
        }

        tracing::info!(connections = closed, "Hub stopped");
    }
}
