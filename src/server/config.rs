//! Hub configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::broadcast::DEFAULT_SEND_TIMEOUT;
use crate::collab::CollaboratorConfig;
use crate::detect::DetectorConfig;
use crate::ingest::DEFAULT_DRAIN_TIMEOUT;
use crate::source::{CameraConfig, SerialConfig};
use crate::supervisor::DEFAULT_HEALTH_INTERVAL;

/// Default WebSocket port
pub const DEFAULT_PORT: u16 = 8765;

/// Smallest outbound queue that still holds the connect reply plus a full
/// state replay
pub const MIN_OUTBOUND_QUEUE: usize = 4;

/// Hub configuration options
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// WebSocket upgrade and hello message must complete within this time
    pub handshake_timeout: Duration,

    /// Per-consumer send timeout, applied to queueing and to socket writes
    pub send_timeout: Duration,

    /// Per-consumer outbound queue depth
    pub outbound_queue: usize,

    /// Ingest queue depth shared by the producer and local sources
    pub ingest_queue: usize,

    /// How long a rejected producer is given to close after the error reply
    pub reject_grace: Duration,

    /// Bind attempts before giving up
    pub bind_attempts: u32,

    /// Bind retry backoff floor
    pub bind_backoff_floor: Duration,

    /// Bind retry backoff ceiling
    pub bind_backoff_ceiling: Duration,

    /// Bound on each shutdown drain phase
    pub drain_timeout: Duration,

    /// Interval between health lines
    pub health_interval: Duration,

    /// Capture frames from the local camera
    pub background_capture: bool,

    pub camera: CameraConfig,

    /// Read the sensor board when set
    pub serial: Option<SerialConfig>,

    /// Run the detector on local frames
    pub auto_capture: bool,

    pub detector: DetectorConfig,

    /// Archive person detections to `capture_dir`
    pub save_detection_images: bool,

    pub capture_dir: PathBuf,

    /// Collaborator API; hooks that need it are skipped when `None`
    pub collaborator: Option<CollaboratorConfig>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 0, // Unlimited
            handshake_timeout: Duration::from_secs(10),
            send_timeout: DEFAULT_SEND_TIMEOUT,
            outbound_queue: 32,
            ingest_queue: 64,
            reject_grace: Duration::from_secs(5),
            bind_attempts: 5,
            bind_backoff_floor: Duration::from_secs(1),
            bind_backoff_ceiling: Duration::from_secs(30),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            health_interval: DEFAULT_HEALTH_INTERVAL,
            background_capture: false,
            camera: CameraConfig::default(),
            serial: None,
            auto_capture: false,
            detector: DetectorConfig::default(),
            save_detection_images: false,
            capture_dir: PathBuf::from("captured_images"),
            collaborator: Some(CollaboratorConfig::default()),
        }
    }
}

impl HubConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum concurrent connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the per-consumer queue depth (never below the replay size)
    pub fn outbound_queue(mut self, depth: usize) -> Self {
        self.outbound_queue = depth.max(MIN_OUTBOUND_QUEUE);
        self
    }

    pub fn ingest_queue(mut self, depth: usize) -> Self {
        self.ingest_queue = depth.max(1);
        self
    }

    pub fn reject_grace(mut self, grace: Duration) -> Self {
        self.reject_grace = grace;
        self
    }

    /// Set bind attempts (at least 1)
    pub fn bind_attempts(mut self, attempts: u32) -> Self {
        self.bind_attempts = attempts.max(1);
        self
    }

    pub fn bind_backoff(mut self, floor: Duration, ceiling: Duration) -> Self {
        self.bind_backoff_floor = floor;
        self.bind_backoff_ceiling = ceiling;
        self
    }

    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    /// Capture from the local camera with the given settings
    pub fn camera(mut self, camera: CameraConfig) -> Self {
        self.background_capture = true;
        self.camera = camera;
        self
    }

    /// Read the sensor board with the given settings
    pub fn serial(mut self, serial: SerialConfig) -> Self {
        self.serial = Some(serial);
        self
    }

    /// Enable auto-capture detection on local frames
    pub fn auto_capture(mut self, detector: DetectorConfig) -> Self {
        self.auto_capture = true;
        self.detector = detector;
        self
    }

    /// Archive person detections under `dir`
    pub fn save_detection_images(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_detection_images = true;
        self.capture_dir = dir.into();
        self
    }

    pub fn collaborator(mut self, collaborator: CollaboratorConfig) -> Self {
        self.collaborator = Some(collaborator);
        self
    }

    /// Run without the collaborator API
    pub fn disable_collaborator(mut self) -> Self {
        self.collaborator = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();

        assert_eq!(config.bind_addr.port(), 8765);
        assert!(config.bind_addr.ip().is_unspecified());
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
        assert_eq!(config.send_timeout, Duration::from_secs(2));
        assert_eq!(config.outbound_queue, 32);
        assert_eq!(config.reject_grace, Duration::from_secs(5));
        assert_eq!(config.bind_attempts, 5);
        assert_eq!(config.health_interval, Duration::from_secs(60));
        assert!(!config.background_capture);
        assert!(config.serial.is_none());
        assert!(!config.auto_capture);
        assert!(!config.save_detection_images);
        assert_eq!(config.capture_dir, PathBuf::from("captured_images"));
        assert!(config.collaborator.is_some());
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = HubConfig::with_addr(addr);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.outbound_queue, 32);
    }

    #[test]
    fn test_queue_floors() {
        let config = HubConfig::default().outbound_queue(1).ingest_queue(0);

        assert_eq!(config.outbound_queue, MIN_OUTBOUND_QUEUE);
        assert_eq!(config.ingest_queue, 1);
    }

    #[test]
    fn test_bind_attempts_at_least_one() {
        let config = HubConfig::default().bind_attempts(0);
        assert_eq!(config.bind_attempts, 1);
    }

    #[test]
    fn test_feature_builders_enable() {
        let config = HubConfig::default()
            .camera(CameraConfig::default().index(1))
            .serial(SerialConfig::default().port("/dev/ttyACM0"))
            .auto_capture(DetectorConfig::default())
            .save_detection_images("/tmp/shots")
            .disable_collaborator();

        assert!(config.background_capture);
        assert_eq!(config.camera.index, 1);
        assert_eq!(
            config.serial.as_ref().and_then(|s| s.port.as_deref()),
            Some("/dev/ttyACM0")
        );
        assert!(config.auto_capture);
        assert!(config.save_detection_images);
        assert_eq!(config.capture_dir, PathBuf::from("/tmp/shots"));
        assert!(config.collaborator.is_none());
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let config = HubConfig::default()
            .bind(addr)
            .max_connections(50)
            .handshake_timeout(Duration::from_secs(3))
            .send_timeout(Duration::from_millis(500))
            .reject_grace(Duration::from_millis(100))
            .bind_backoff(Duration::from_millis(10), Duration::from_millis(40))
            .drain_timeout(Duration::from_secs(1));

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.handshake_timeout, Duration::from_secs(3));
        assert_eq!(config.send_timeout, Duration::from_millis(500));
        assert_eq!(config.reject_grace, Duration::from_millis(100));
        assert_eq!(config.bind_backoff_floor, Duration::from_millis(10));
        assert_eq!(config.bind_backoff_ceiling, Duration::from_millis(40));
        assert_eq!(config.drain_timeout, Duration::from_secs(1));
    }
}
