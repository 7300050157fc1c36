//! Relay wire protocol
//!
//! Every connection is a WebSocket. The first message declares the role:
//!
//! ```text
//! client → hub   {"type": "producer"}            (or "consumer", the default)
//! hub → client   {"status": "connected", "message": "..."}
//! ```
//!
//! After the handshake a producer sends raw encoded images as binary messages
//! and detection events as `{"type": "detection", "data": {...}}`. Consumers
//! receive both exactly as the producer sent them.

pub mod detection;
pub mod image;
pub mod message;
pub mod sensor;

pub use detection::{Detection, DetectionEvent, InvalidDetection};
pub use image::ImageFormat;
pub use message::{
    classify, detection_message, sensor_message, Inbound, Malformed, Reply, ReplyStatus, Role,
};
pub use sensor::{MotionTracker, SensorReading};
