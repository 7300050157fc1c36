//! Upstream source adapter
//!
//! Drives one local device through its connect / read / reconnect cycle and
//! feeds whatever it produces into the ingest queue.
//!
//! ```text
//!              open ok                      read error × max
//!  Disconnected ───────► Connected ─────────────────────────► Disconnected
//!      ▲  │                  │       clean close                  │
//!      │  │ open err         └────────────────────────────────────┘
//!      │  ▼                                 (SourceLost queued to ingest)
//!      └─ sleep(backoff)
//!
//!  any state ── cancel ──► Draining (close device, exit)
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::ingest::{Ingest, IngestSender, SourceArbiter};
use crate::protocol::{sensor_message, SensorReading};

use super::backoff::Backoff;
use super::error::SourceError;

/// Default reconnect backoff floor
pub const DEFAULT_BACKOFF_FLOOR: Duration = Duration::from_secs(1);

/// Default reconnect backoff ceiling
pub const DEFAULT_BACKOFF_CEILING: Duration = Duration::from_secs(60);

/// Default consecutive read failures tolerated before reconnecting
pub const DEFAULT_MAX_READ_FAILURES: u32 = 5;

/// What kind of device a source reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Camera,
    Serial,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Camera => "camera",
            SourceKind::Serial => "serial",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of data read from a device
#[derive(Debug, Clone, PartialEq)]
pub enum SourceItem {
    /// Encoded image
    Frame(Bytes),
    /// Parsed sensor line
    Sensor(SensorReading),
}

impl SourceItem {
    /// Wire message for this item
    pub fn into_message(self) -> Result<Message, serde_json::Error> {
        match self {
            SourceItem::Frame(frame) => Ok(Message::binary(frame)),
            SourceItem::Sensor(reading) => sensor_message(&reading),
        }
    }
}

/// A local device the hub can read from
#[async_trait]
pub trait UpstreamSource: Send {
    fn kind(&self) -> SourceKind;

    /// Human-readable device description for logs
    fn describe(&self) -> String;

    /// Acquire the device
    async fn open(&mut self) -> Result<(), SourceError>;

    /// Read the next item; `Ok(None)` means the device closed cleanly
    async fn read(&mut self) -> Result<Option<SourceItem>, SourceError>;

    /// Release the device; must be safe to call when not open
    async fn close(&mut self);
}

/// Adapter lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Disconnected,
    Connected,
    Draining,
}

impl AdapterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterState::Disconnected => "disconnected",
            AdapterState::Connected => "connected",
            AdapterState::Draining => "draining",
        }
    }
}

/// Read-only view of a running adapter, for health reporting
#[derive(Debug, Clone)]
pub struct SourceHandle {
    pub kind: SourceKind,
    pub description: String,
    state: watch::Receiver<AdapterState>,
}

impl SourceHandle {
    pub fn state(&self) -> AdapterState {
        *self.state.borrow()
    }

    /// Wait until the adapter reaches `target`
    pub async fn wait_for(&mut self, target: AdapterState) -> bool {
        self.state.wait_for(|s| *s == target).await.is_ok()
    }
}

enum ReadEnd {
    Cancelled,
    IngestClosed,
    Closed,
    Failed,
}

/// Runs an [`UpstreamSource`] until cancelled
pub struct SourceAdapter<S: UpstreamSource> {
    source: S,
    ingest: IngestSender,
    arbiter: Option<Arc<SourceArbiter>>,
    backoff: Backoff,
    max_read_failures: u32,
    state: watch::Sender<AdapterState>,
}

impl<S: UpstreamSource> SourceAdapter<S> {
    pub fn new(source: S, ingest: IngestSender) -> Self {
        let (state, _) = watch::channel(AdapterState::Disconnected);
        Self {
            source,
            ingest,
            arbiter: None,
            backoff: Backoff::new(DEFAULT_BACKOFF_FLOOR, DEFAULT_BACKOFF_CEILING),
            max_read_failures: DEFAULT_MAX_READ_FAILURES,
            state,
        }
    }

    /// Announce camera availability to the arbiter while connected
    pub fn with_arbiter(mut self, arbiter: Arc<SourceArbiter>) -> Self {
        self.arbiter = Some(arbiter);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the consecutive read-failure budget (at least one)
    pub fn with_max_read_failures(mut self, max: u32) -> Self {
        self.max_read_failures = max.max(1);
        self
    }

    pub fn handle(&self) -> SourceHandle {
        SourceHandle {
            kind: self.source.kind(),
            description: self.source.describe(),
            state: self.state.subscribe(),
        }
    }

    fn set_state(&self, state: AdapterState) {
        self.state.send_replace(state);
    }

    fn announce(&self, active: bool) {
        if self.source.kind() == SourceKind::Camera {
            if let Some(ref arbiter) = self.arbiter {
                arbiter.set_local_frames(active);
            }
        }
    }

    /// Run the state machine until `cancel` fires or ingest goes away
    pub async fn run(mut self, cancel: CancellationToken) {
        let kind = self.source.kind();
        let device = self.source.describe();

        loop {
            self.set_state(AdapterState::Disconnected);

            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.source.open() => result,
            };

            if let Err(e) = opened {
                let delay = self.backoff.fail();
                tracing::warn!(
                    source = %kind,
                    device = %device,
                    error = %e,
                    attempt = self.backoff.failures(),
                    retry_in_ms = delay.as_millis() as u64,
                    "Source open failed"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => continue,
                }
            }

            self.backoff.reset();
            self.set_state(AdapterState::Connected);
            self.announce(true);
            tracing::info!(source = %kind, device = %device, "Source connected");

            let ended = self.read_loop(&cancel).await;

            self.announce(false);
            self.source.close().await;

            match ended {
                ReadEnd::Cancelled | ReadEnd::IngestClosed => break,
                ReadEnd::Closed => {
                    tracing::info!(source = %kind, device = %device, "Source closed")
                }
                ReadEnd::Failed => tracing::warn!(
                    source = %kind,
                    device = %device,
                    failures = self.max_read_failures,
                    "Too many read failures, reconnecting"
                ),
            }

            if !self.report_lost(&cancel).await {
                break;
            }

            // Brief pause so a device that opens and immediately fails
            // cannot spin
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.backoff.current()) => {}
            }
        }

        self.set_state(AdapterState::Draining);
        self.announce(false);
        self.source.close().await;
        tracing::info!(source = %kind, device = %device, "Source stopped");
    }

    /// Queue a marker behind this session's data so ingest can reset
    /// whatever it tracks across the device's readings
    async fn report_lost(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            sent = self.ingest.send(Ingest::source_lost(self.source.kind())) => sent.is_ok(),
        }
    }

    async fn read_loop(&mut self, cancel: &CancellationToken) -> ReadEnd {
        let kind = self.source.kind();
        let mut failures = 0u32;

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return ReadEnd::Cancelled,
                result = self.source.read() => result,
            };

            match read {
                Ok(Some(item)) => {
                    failures = 0;
                    let message = match item.into_message() {
                        Ok(message) => message,
                        Err(e) => {
                            tracing::warn!(
                                source = %kind,
                                error = %e,
                                "Failed to encode source item"
                            );
                            continue;
                        }
                    };

                    let sent = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return ReadEnd::Cancelled,
                        sent = self.ingest.send(Ingest::local(message)) => sent,
                    };
                    if sent.is_err() {
                        tracing::debug!(source = %kind, "Ingest queue closed");
                        return ReadEnd::IngestClosed;
                    }
                }
                Ok(None) => return ReadEnd::Closed,
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        source = %kind,
                        error = %e,
                        failures = failures,
                        max = self.max_read_failures,
                        "Source read failed"
                    );
                    if failures >= self.max_read_failures {
                        return ReadEnd::Failed;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::mpsc;

    use super::*;
    use crate::ingest::Origin;

    /// Replays scripted open and read results, then idles
    struct ScriptedSource {
        kind: SourceKind,
        opens: VecDeque<Result<(), SourceError>>,
        reads: VecDeque<Result<Option<SourceItem>, SourceError>>,
        open_calls: Arc<AtomicUsize>,
        close_calls: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(kind: SourceKind) -> Self {
            Self {
                kind,
                opens: VecDeque::new(),
                reads: VecDeque::new(),
                open_calls: Arc::new(AtomicUsize::new(0)),
                close_calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl UpstreamSource for ScriptedSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }

        async fn open(&mut self) -> Result<(), SourceError> {
            self.open_calls.fetch_add(1, Ordering::SeqCst);
            self.opens
                .pop_front()
                .unwrap_or_else(|| Err(SourceError::NoDevice("script exhausted".into())))
        }

        async fn read(&mut self) -> Result<Option<SourceItem>, SourceError> {
            match self.reads.pop_front() {
                Some(result) => result,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn frame(tag: u8) -> Bytes {
        Bytes::from(vec![0xFF, 0xD8, 0xFF, tag])
    }

    fn fast_backoff() -> Backoff {
        Backoff::new(Duration::from_millis(1), Duration::from_millis(8))
    }

    fn read_error() -> SourceError {
        SourceError::Read(std::io::Error::new(std::io::ErrorKind::Other, "glitch"))
    }

    #[tokio::test]
    async fn test_retries_open_then_forwards_frames() {
        let mut source = ScriptedSource::new(SourceKind::Camera);
        source.opens.extend([
            Err(SourceError::NoDevice("video0".into())),
            Err(SourceError::NoDevice("video0".into())),
            Ok(()),
        ]);
        source.reads.extend([
            Ok(Some(SourceItem::Frame(frame(1)))),
            Ok(Some(SourceItem::Frame(frame(2)))),
        ]);
        let open_calls = Arc::clone(&source.open_calls);

        let (tx, mut rx) = mpsc::channel(8);
        let arbiter = Arc::new(SourceArbiter::new(false));
        let adapter = SourceAdapter::new(source, tx)
            .with_backoff(fast_backoff())
            .with_arbiter(Arc::clone(&arbiter));
        let mut handle = adapter.handle();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(adapter.run(cancel.clone()));

        assert_eq!(
            rx.recv().await.unwrap(),
            Ingest::local(Message::binary(frame(1)))
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            Ingest::local(Message::binary(frame(2)))
        );

        assert_eq!(open_calls.load(Ordering::SeqCst), 3);
        assert_eq!(handle.state(), AdapterState::Connected);
        assert!(arbiter.local_frames_active());

        cancel.cancel();
        task.await.unwrap();
        assert!(handle.wait_for(AdapterState::Draining).await);
        assert!(!arbiter.local_frames_active());
    }

    #[tokio::test]
    async fn test_read_failures_trigger_reconnect() {
        let mut source = ScriptedSource::new(SourceKind::Serial);
        source.opens.extend([Ok(()), Ok(())]);
        source.reads.extend([
            Err(read_error()),
            Ok(Some(SourceItem::Sensor(SensorReading {
                humidity: Some(40.0),
                ..Default::default()
            }))),
            Err(read_error()),
            Err(read_error()),
            Err(read_error()),
        ]);
        let open_calls = Arc::clone(&source.open_calls);
        let close_calls = Arc::clone(&source.close_calls);

        let (tx, mut rx) = mpsc::channel(8);
        let adapter = SourceAdapter::new(source, tx)
            .with_backoff(fast_backoff())
            .with_max_read_failures(3);
        let mut handle = adapter.handle();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(adapter.run(cancel.clone()));

        // One isolated failure is tolerated
        let item = rx.recv().await.unwrap();
        assert!(matches!(
            item,
            Ingest::Message {
                origin: Origin::Local,
                message: Message::Text(_),
            }
        ));

        // Three in a row close and reopen the device
        tokio::time::timeout(Duration::from_secs(2), async {
            while open_calls.load(Ordering::SeqCst) < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(handle.wait_for(AdapterState::Connected).await);
        assert_eq!(close_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            rx.recv().await.unwrap(),
            Ingest::source_lost(SourceKind::Serial)
        );

        cancel.cancel();
        task.await.unwrap();
        assert!(close_calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_clean_close_reopens() {
        let mut source = ScriptedSource::new(SourceKind::Camera);
        source.opens.extend([Ok(()), Ok(())]);
        source.reads.extend([Ok(Some(SourceItem::Frame(frame(1)))), Ok(None)]);
        let open_calls = Arc::clone(&source.open_calls);

        let (tx, mut rx) = mpsc::channel(8);
        let adapter = SourceAdapter::new(source, tx).with_backoff(fast_backoff());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(adapter.run(cancel.clone()));

        rx.recv().await.unwrap();
        // The marker follows the session's last frame
        assert_eq!(
            rx.recv().await.unwrap(),
            Ingest::source_lost(SourceKind::Camera)
        );
        tokio::time::timeout(Duration::from_secs(2), async {
            while open_calls.load(Ordering::SeqCst) < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_while_disconnected() {
        // Never opens
        let source = ScriptedSource::new(SourceKind::Camera);
        let close_calls = Arc::clone(&source.close_calls);

        let (tx, _rx) = mpsc::channel(8);
        let adapter = SourceAdapter::new(source, tx)
            .with_backoff(Backoff::new(Duration::from_secs(30), Duration::from_secs(60)));
        let handle = adapter.handle();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(adapter.run(cancel.clone()));

        tokio::task::yield_now().await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(handle.state(), AdapterState::Draining);
        assert_eq!(close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stops_when_ingest_closed() {
        let mut source = ScriptedSource::new(SourceKind::Camera);
        source.opens.push_back(Ok(()));
        source.reads.push_back(Ok(Some(SourceItem::Frame(frame(1)))));

        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let adapter = SourceAdapter::new(source, tx).with_backoff(fast_backoff());

        tokio::time::timeout(Duration::from_secs(1), adapter.run(CancellationToken::new()))
            .await
            .unwrap();
    }

    #[test]
    fn test_sensor_item_message() {
        let item = SourceItem::Sensor(SensorReading {
            smoke_detected: Some(false),
            ..Default::default()
        });
        assert_eq!(
            item.into_message().unwrap(),
            Message::text(r#"{"type":"sensor","data":{"smokeDetected":false}}"#)
        );
    }
}
