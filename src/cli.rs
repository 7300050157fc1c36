use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use homecam_relay::collab::CollaboratorConfig;
use homecam_relay::detect::DetectorConfig;
use homecam_relay::source::{CameraConfig, SerialConfig};
use homecam_relay::HubConfig;

/// homecam-relay: camera frame and sensor event relay hub
#[derive(Parser, Debug)]
#[command(name = "homecam-relay", version)]
#[command(about = "Relay camera frames, detections and sensor readings to WebSocket clients", long_about = None)]
pub struct Cli {
    /// Address to bind the WebSocket server to
    #[arg(long, env = "CAMERA_RELAY_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to bind the WebSocket server to
    #[arg(long, env = "CAMERA_RELAY_PORT", default_value_t = 8765)]
    pub port: u16,

    /// Capture frames from the local camera
    #[arg(long, env = "BACKGROUND_CAPTURE")]
    pub background_capture: bool,

    /// Camera device index
    #[arg(long, env = "CAMERA_INDEX", default_value_t = 0)]
    pub camera_index: u32,

    /// Program that writes MJPEG from the camera to stdout
    #[arg(long, env = "CAPTURE_PROGRAM", default_value = "ffmpeg")]
    pub capture_program: String,

    /// Capture frame rate
    #[arg(long, env = "CAPTURE_FPS", default_value_t = 10)]
    pub capture_fps: u32,

    /// Run person detection on local frames
    #[arg(long, env = "AUTO_CAPTURE")]
    pub auto_capture: bool,

    /// Save person detections with their metadata
    #[arg(long, env = "SAVE_DETECTION_IMAGES")]
    pub save_detection_images: bool,

    /// Directory for saved detections
    #[arg(long, env = "CAPTURE_DIR", default_value = "captured_images")]
    pub capture_dir: PathBuf,

    /// Read the sensor board over serial
    #[arg(long, env = "SENSOR_SERIAL")]
    pub serial: bool,

    /// Serial port (discovered when omitted)
    #[arg(long, env = "SERIAL_PORT")]
    pub serial_port: Option<String>,

    /// Serial baud rate
    #[arg(long, env = "SERIAL_BAUD_RATE", default_value_t = 9600)]
    pub baud_rate: u32,

    /// Collaborator API base URL
    #[arg(long, env = "SENSOR_API_URL", default_value = "http://localhost:8000/api")]
    pub api_url: String,

    /// Run without the collaborator API
    #[arg(long, env = "NO_API")]
    pub no_api: bool,

    /// Person detection endpoint (fallback detector when omitted)
    #[arg(long, env = "DETECTOR_URL")]
    pub detector_url: Option<String>,

    /// Minimum confidence for a detection to count
    #[arg(long, env = "CONFIDENCE_THRESHOLD", default_value_t = 0.4)]
    pub confidence_threshold: f64,

    /// Seconds between health lines
    #[arg(long, env = "HEALTH_INTERVAL_SECS", default_value_t = 60)]
    pub health_interval_secs: u64,

    /// Maximum concurrent connections (0 = unlimited)
    #[arg(long, env = "MAX_CONNECTIONS", default_value_t = 0)]
    pub max_connections: usize,
}

impl Cli {
    /// Parse CLI arguments from the environment
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Hub configuration for these arguments
    pub fn into_config(self) -> HubConfig {
        let camera = CameraConfig::default()
            .index(self.camera_index)
            .program(self.capture_program)
            .fps(self.capture_fps);

        let mut detector =
            DetectorConfig::default().confidence_threshold(self.confidence_threshold);
        if let Some(url) = self.detector_url {
            detector = detector.url(url);
        }

        let mut config = HubConfig::default()
            .bind(SocketAddr::new(self.host, self.port))
            .max_connections(self.max_connections)
            .health_interval(Duration::from_secs(self.health_interval_secs.max(1)));

        config.camera = camera;
        config.background_capture = self.background_capture;
        config.detector = detector;
        config.auto_capture = self.auto_capture;
        config.save_detection_images = self.save_detection_images;
        config.capture_dir = self.capture_dir;

        if self.serial {
            let mut serial = SerialConfig::default().baud_rate(self.baud_rate);
            if let Some(port) = self.serial_port {
                serial = serial.port(port);
            }
            config = config.serial(serial);
        }

        if self.no_api {
            config.disable_collaborator()
        } else {
            config.collaborator(CollaboratorConfig::with_url(self.api_url))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let cli = Cli::try_parse_from(["homecam-relay"]).unwrap();
        assert_eq!(cli.host, IpAddr::from([0, 0, 0, 0]));
        assert_eq!(cli.port, 8765);
        assert!(!cli.background_capture);
        assert_eq!(cli.camera_index, 0);
        assert_eq!(cli.capture_program, "ffmpeg");
        assert!(!cli.auto_capture);
        assert_eq!(cli.capture_dir, PathBuf::from("captured_images"));
        assert!(!cli.serial);
        assert!(cli.serial_port.is_none());
        assert_eq!(cli.baud_rate, 9600);
        assert_eq!(cli.api_url, "http://localhost:8000/api");
        assert!(!cli.no_api);
        assert!(cli.detector_url.is_none());
        assert_eq!(cli.health_interval_secs, 60);
    }

    #[test]
    fn test_default_config() {
        let config = Cli::try_parse_from(["homecam-relay"]).unwrap().into_config();
        assert_eq!(config.bind_addr, "0.0.0.0:8765".parse().unwrap());
        assert!(!config.background_capture);
        assert!(config.serial.is_none());
        assert_eq!(
            config.collaborator.map(|c| c.api_url),
            Some("http://localhost:8000/api".to_string())
        );
    }

    #[test]
    fn test_override_bind() {
        let cli = Cli::try_parse_from(["homecam-relay", "--host", "127.0.0.1", "--port", "9000"])
            .unwrap();
        assert_eq!(
            cli.into_config().bind_addr,
            "127.0.0.1:9000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_invalid_host_rejected() {
        assert!(Cli::try_parse_from(["homecam-relay", "--host", "not-an-ip"]).is_err());
    }

    #[test]
    fn test_capture_flags() {
        let config = Cli::try_parse_from([
            "homecam-relay",
            "--background-capture",
            "--camera-index",
            "2",
            "--capture-fps",
            "5",
            "--auto-capture",
            "--detector-url",
            "http://localhost:5000/detect",
            "--save-detection-images",
            "--capture-dir",
            "/var/lib/homecam",
        ])
        .unwrap()
        .into_config();

        assert!(config.background_capture);
        assert_eq!(config.camera.index, 2);
        assert_eq!(config.camera.fps, 5);
        assert!(config.auto_capture);
        assert_eq!(
            config.detector.url.as_deref(),
            Some("http://localhost:5000/detect")
        );
        assert!(config.save_detection_images);
        assert_eq!(config.capture_dir, PathBuf::from("/var/lib/homecam"));
    }

    #[test]
    fn test_serial_flags() {
        let config = Cli::try_parse_from([
            "homecam-relay",
            "--serial",
            "--serial-port",
            "/dev/ttyACM0",
            "--baud-rate",
            "115200",
        ])
        .unwrap()
        .into_config();

        let serial = config.serial.unwrap();
        assert_eq!(serial.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(serial.baud_rate, 115200);
    }

    #[test]
    fn test_serial_port_alone_does_not_enable() {
        let config = Cli::try_parse_from(["homecam-relay", "--serial-port", "/dev/ttyACM0"])
            .unwrap()
            .into_config();
        assert!(config.serial.is_none());
    }

    #[test]
    fn test_no_api() {
        let config = Cli::try_parse_from(["homecam-relay", "--no-api"])
            .unwrap()
            .into_config();
        assert!(config.collaborator.is_none());
    }
}
