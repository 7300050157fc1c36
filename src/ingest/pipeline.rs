//! Single-task ingestion of producer and local-source messages

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::broadcast::{BroadcastEngine, BroadcastReport};
use crate::cache::StateCache;
use crate::collab::DetectionHooks;
use crate::detect::AutoCapture;
use crate::protocol::{classify, Inbound, Malformed, MotionTracker};
use crate::registry::ConnectionId;
use crate::source::SourceKind;
use crate::stats::RelayStats;

use super::arbiter::SourceArbiter;

/// Default bound on draining the queue at shutdown
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Where an ingested message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Camera, serial line or auto-capture inside the hub
    Local,
    /// The registered producer connection
    Producer(ConnectionId),
}

/// One item waiting to be ingested
#[derive(Debug, Clone, PartialEq)]
pub enum Ingest {
    Message { origin: Origin, message: Message },
    /// A local device dropped; state tracked across its readings starts over
    SourceLost(SourceKind),
}

impl Ingest {
    pub fn local(message: Message) -> Self {
        Ingest::Message {
            origin: Origin::Local,
            message,
        }
    }

    pub fn producer(id: ConnectionId, message: Message) -> Self {
        Ingest::Message {
            origin: Origin::Producer(id),
            message,
        }
    }

    pub fn source_lost(kind: SourceKind) -> Self {
        Ingest::SourceLost(kind)
    }
}

/// Sending half of the ingest queue
pub type IngestSender = mpsc::Sender<Ingest>;

/// What happened to one ingested message
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Frame(BroadcastReport),
    Detection(BroadcastReport),
    Sensor(BroadcastReport),
    /// Producer data displaced by an active local source
    Suppressed,
    Malformed(Malformed),
    /// Control frames
    Ignored,
}

/// Owns the write side of the state cache and drives the broadcast engine
///
/// Exactly one `Ingestor` runs per hub, so messages are processed strictly
/// one at a time in arrival order.
pub struct Ingestor {
    cache: Arc<StateCache>,
    engine: BroadcastEngine,
    arbiter: Arc<SourceArbiter>,
    stats: Arc<RelayStats>,
    hooks: Option<DetectionHooks>,
    auto_capture: Option<AutoCapture>,
    motion: MotionTracker,
    drain_timeout: Duration,
}

impl Ingestor {
    pub fn new(
        cache: Arc<StateCache>,
        engine: BroadcastEngine,
        arbiter: Arc<SourceArbiter>,
        stats: Arc<RelayStats>,
    ) -> Self {
        Self {
            cache,
            engine,
            arbiter,
            stats,
            hooks: None,
            auto_capture: None,
            motion: MotionTracker::new(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_hooks(mut self, hooks: DetectionHooks) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn with_auto_capture(mut self, auto_capture: AutoCapture) -> Self {
        self.auto_capture = Some(auto_capture);
        self
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Process one message to completion
    pub async fn process(&mut self, item: Ingest) -> IngestOutcome {
        let (origin, message) = match item {
            Ingest::Message { origin, message } => (origin, message),
            Ingest::SourceLost(kind) => return self.source_lost(kind),
        };
        let excluding = match origin {
            Origin::Producer(id) => Some(id),
            Origin::Local => None,
        };

        match classify(&message) {
            Inbound::Frame(frame) => {
                if excluding.is_some() && self.arbiter.local_frames_active() {
                    return self.suppressed(origin, "frame");
                }

                self.cache.update_frame(frame.clone());
                self.stats.record_frame(frame.len());
                let report = self.engine.broadcast(message, excluding).await;

                if origin == Origin::Local {
                    if let Some(ref mut auto) = self.auto_capture {
                        auto.offer(frame);
                    }
                }

                IngestOutcome::Frame(report)
            }
            Inbound::Detection(event) => {
                if excluding.is_some() && self.arbiter.local_detections_active() {
                    return self.suppressed(origin, "detection");
                }

                self.cache.update_detection(event.clone(), message.clone());
                self.stats.record_detection();
                let report = self.engine.broadcast(message, excluding).await;

                if let Some(ref mut hooks) = self.hooks {
                    hooks.on_detection(&event, self.cache.latest_frame());
                }

                IngestOutcome::Detection(report)
            }
            Inbound::Sensor(reading) => {
                let rising = self.motion.observe(&reading);

                self.cache.update_sensor(reading, message.clone());
                self.stats.record_sensor();
                let report = self.engine.broadcast(message, excluding).await;

                if rising {
                    tracing::info!("Motion detected");
                    if let Some(ref mut hooks) = self.hooks {
                        hooks.on_motion(self.cache.latest_frame());
                    }
                }

                IngestOutcome::Sensor(report)
            }
            Inbound::Control => IngestOutcome::Ignored,
            Inbound::Malformed(reason) => {
                tracing::debug!(origin = ?origin, reason = %reason, "Dropping malformed message");
                self.stats.record_malformed();
                IngestOutcome::Malformed(reason)
            }
        }
    }

    fn source_lost(&mut self, kind: SourceKind) -> IngestOutcome {
        if kind == SourceKind::Serial {
            self.motion.reset();
            tracing::debug!("Sensor line dropped, motion state reset");
        }
        IngestOutcome::Ignored
    }

    fn suppressed(&self, origin: Origin, kind: &'static str) -> IngestOutcome {
        tracing::debug!(
            origin = ?origin,
            kind = kind,
            "Local source active, ignoring producer data"
        );
        self.stats.record_suppressed();
        IngestOutcome::Suppressed
    }

    /// Process messages until cancelled or every sender is gone
    ///
    /// On cancellation the queue is closed to new messages and whatever is
    /// already queued is processed, bounded by the drain timeout. Returns the
    /// hooks so the caller can wait for their in-flight tasks.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<Ingest>,
        cancel: CancellationToken,
    ) -> Option<DetectionHooks> {
        tracing::debug!("Ingest loop started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                item = rx.recv() => match item {
                    Some(item) => {
                        self.process(item).await;
                    }
                    None => {
                        tracing::debug!("Ingest queue closed");
                        return self.hooks;
                    }
                },
            }
        }

        rx.close();
        let drain_timeout = self.drain_timeout;
        let drained = tokio::time::timeout(drain_timeout, async {
            let mut count = 0usize;
            while let Some(item) = rx.recv().await {
                self.process(item).await;
                count += 1;
            }
            count
        })
        .await;

        match drained {
            Ok(count) => tracing::info!(drained = count, "Ingest loop drained"),
            Err(_) => tracing::warn!(
                timeout_ms = drain_timeout.as_millis() as u64,
                "Ingest drain timed out, discarding remaining messages"
            ),
        }

        self.hooks
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use bytes::Bytes;

    use super::*;
    use crate::protocol::{sensor_message, SensorReading};
    use crate::registry::{ConnectionInfo, ConnectionRegistry, Registration};

    const SCENARIO: &str = r#"{"type":"detection","data":{"timestamp":"2024-01-01T00:00:00Z","detections":[{"class":"person","confidence":0.92,"bbox":[0.1,0.2,0.6,0.8]}],"personDetected":true}}"#;

    struct Fixture {
        registry: Arc<ConnectionRegistry>,
        cache: Arc<StateCache>,
        arbiter: Arc<SourceArbiter>,
        stats: Arc<RelayStats>,
        ingestor: Ingestor,
    }

    fn fixture(local_detection: bool) -> Fixture {
        let registry = Arc::new(ConnectionRegistry::new());
        let cache = Arc::new(StateCache::new());
        let arbiter = Arc::new(SourceArbiter::new(local_detection));
        let stats = Arc::new(RelayStats::new());
        let engine = BroadcastEngine::new(Arc::clone(&registry), Arc::clone(&stats));
        let ingestor = Ingestor::new(
            Arc::clone(&cache),
            engine,
            Arc::clone(&arbiter),
            Arc::clone(&stats),
        );

        Fixture {
            registry,
            cache,
            arbiter,
            stats,
            ingestor,
        }
    }

    async fn add_consumer(registry: &ConnectionRegistry, id: u64) -> mpsc::Receiver<Message> {
        let addr: SocketAddr = format!("10.0.0.2:{}", 42000 + id).parse().unwrap();
        let (tx, rx) = mpsc::channel(16);
        registry
            .register(
                ConnectionInfo::new(ConnectionId(id), addr),
                Registration::Consumer { outbound: tx },
            )
            .await
            .unwrap();
        rx
    }

    fn jpeg() -> Bytes {
        Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0xFF, 0xD9])
    }

    const PRODUCER: ConnectionId = ConnectionId(1);

    #[tokio::test]
    async fn test_frame_cached_and_forwarded_unchanged() {
        let mut f = fixture(false);
        let mut rx = add_consumer(&f.registry, 2).await;

        let outcome = f
            .ingestor
            .process(Ingest::producer(PRODUCER, Message::binary(jpeg())))
            .await;

        match outcome {
            IngestOutcome::Frame(report) => assert_eq!(report.delivered, 1),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(f.cache.latest_frame(), Some(jpeg()));
        assert_eq!(rx.recv().await.unwrap(), Message::binary(jpeg()));
        assert_eq!(f.stats.snapshot().frames_ingested, 1);
    }

    #[tokio::test]
    async fn test_detection_forwarded_verbatim() {
        let mut f = fixture(false);
        let mut rx = add_consumer(&f.registry, 2).await;

        let outcome = f
            .ingestor
            .process(Ingest::producer(PRODUCER, Message::text(SCENARIO)))
            .await;

        assert!(matches!(outcome, IngestOutcome::Detection(_)));
        assert_eq!(rx.recv().await.unwrap(), Message::text(SCENARIO));

        let cached = f.cache.snapshot().detection.unwrap();
        assert_eq!(cached.message, Message::text(SCENARIO));
        assert_eq!(cached.event.timestamp, "2024-01-01T00:00:00Z");
        assert!(cached.event.person_detected);
    }

    #[tokio::test]
    async fn test_malformed_dropped_loop_continues() {
        let mut f = fixture(false);
        let mut rx = add_consumer(&f.registry, 2).await;

        let bad = [
            Message::text("not json"),
            Message::text(r#"{"type":"telemetry","data":{}}"#),
            Message::binary(Bytes::from_static(b"\x00\x01\x02")),
            Message::binary(Bytes::new()),
        ];
        for message in bad {
            let outcome = f.ingestor.process(Ingest::producer(PRODUCER, message)).await;
            assert!(matches!(outcome, IngestOutcome::Malformed(_)));
        }

        f.ingestor
            .process(Ingest::producer(PRODUCER, Message::binary(jpeg())))
            .await;

        assert_eq!(rx.recv().await.unwrap(), Message::binary(jpeg()));
        assert_eq!(f.stats.snapshot().malformed_dropped, 4);
        assert!(f.cache.snapshot().detection.is_none());
    }

    #[tokio::test]
    async fn test_invalid_detection_not_cached() {
        let mut f = fixture(false);
        let bad = r#"{"type":"detection","data":{"timestamp":"yesterday","detections":[],"personDetected":false}}"#;

        let outcome = f
            .ingestor
            .process(Ingest::producer(PRODUCER, Message::text(bad)))
            .await;

        assert!(matches!(
            outcome,
            IngestOutcome::Malformed(Malformed::InvalidDetection(_))
        ));
        assert!(f.cache.snapshot().detection.is_none());
    }

    #[tokio::test]
    async fn test_control_ignored() {
        let mut f = fixture(false);
        let outcome = f
            .ingestor
            .process(Ingest::producer(PRODUCER, Message::Ping(Bytes::new())))
            .await;

        assert_eq!(outcome, IngestOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_local_camera_wins_over_producer() {
        let mut f = fixture(false);
        f.arbiter.set_local_frames(true);

        let producer_frame = Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0x01]);
        let outcome = f
            .ingestor
            .process(Ingest::producer(PRODUCER, Message::binary(producer_frame)))
            .await;
        assert_eq!(outcome, IngestOutcome::Suppressed);
        assert!(f.cache.latest_frame().is_none());

        // Local frames still flow
        let outcome = f.ingestor.process(Ingest::local(Message::binary(jpeg()))).await;
        assert!(matches!(outcome, IngestOutcome::Frame(_)));

        // Producer detections pass when the hub is not detecting locally
        let outcome = f
            .ingestor
            .process(Ingest::producer(PRODUCER, Message::text(SCENARIO)))
            .await;
        assert!(matches!(outcome, IngestOutcome::Detection(_)));

        // Local source drops: producer frames are accepted again
        f.arbiter.set_local_frames(false);
        let outcome = f
            .ingestor
            .process(Ingest::producer(PRODUCER, Message::binary(jpeg())))
            .await;
        assert!(matches!(outcome, IngestOutcome::Frame(_)));
        assert_eq!(f.stats.snapshot().producer_suppressed, 1);
    }

    #[tokio::test]
    async fn test_local_detection_displaces_producer_detection() {
        let mut f = fixture(true);
        f.arbiter.set_local_frames(true);

        let outcome = f
            .ingestor
            .process(Ingest::producer(PRODUCER, Message::text(SCENARIO)))
            .await;
        assert_eq!(outcome, IngestOutcome::Suppressed);

        let outcome = f.ingestor.process(Ingest::local(Message::text(SCENARIO))).await;
        assert!(matches!(outcome, IngestOutcome::Detection(_)));
    }

    #[tokio::test]
    async fn test_sensor_cached_and_broadcast() {
        let mut f = fixture(true);
        f.arbiter.set_local_frames(true);
        let mut rx = add_consumer(&f.registry, 2).await;

        let reading = SensorReading {
            temperature: Some(21.5),
            motion_detected: Some(true),
            ..Default::default()
        };
        let message = sensor_message(&reading).unwrap();

        let outcome = f.ingestor.process(Ingest::local(message.clone())).await;

        assert!(matches!(outcome, IngestOutcome::Sensor(_)));
        assert_eq!(rx.recv().await.unwrap(), message);
        assert_eq!(f.cache.snapshot().sensor.unwrap().reading, reading);
    }

    #[tokio::test]
    async fn test_serial_drop_resets_motion_edge() {
        let mut f = fixture(false);
        let on = SensorReading {
            motion_detected: Some(true),
            ..Default::default()
        };

        let outcome = f
            .ingestor
            .process(Ingest::local(sensor_message(&on).unwrap()))
            .await;
        assert!(matches!(outcome, IngestOutcome::Sensor(_)));

        // Losing the camera says nothing about the PIR line
        let outcome = f.ingestor.process(Ingest::source_lost(SourceKind::Camera)).await;
        assert_eq!(outcome, IngestOutcome::Ignored);
        assert!(!f.ingestor.motion.observe(&on));

        // After the serial line drops, the next motion is a fresh rising edge
        f.ingestor
            .process(Ingest::source_lost(SourceKind::Serial))
            .await;
        assert!(f.ingestor.motion.observe(&on));
    }

    #[tokio::test]
    async fn test_run_drains_on_cancel() {
        let f = fixture(false);
        let mut consumer = add_consumer(&f.registry, 2).await;
        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        // Queue before the loop starts, then cancel immediately
        for _ in 0..3 {
            tx.send(Ingest::producer(PRODUCER, Message::binary(jpeg())))
                .await
                .unwrap();
        }
        cancel.cancel();

        f.ingestor.run(rx, cancel).await;

        for _ in 0..3 {
            assert_eq!(consumer.recv().await.unwrap(), Message::binary(jpeg()));
        }
        // Closed to new input
        assert!(tx
            .send(Ingest::local(Message::binary(jpeg())))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_run_ends_when_senders_gone() {
        let f = fixture(false);
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(f.ingestor.run(rx, cancel));
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
