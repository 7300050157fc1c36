//! Wire messages and inbound classification

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

use super::detection::{DetectionEvent, InvalidDetection};
use super::image::ImageFormat;
use super::sensor::SensorReading;

/// Envelope type for detection events
pub const DETECTION_TYPE: &str = "detection";

/// Envelope type for sensor readings
pub const SENSOR_TYPE: &str = "sensor";

/// Role declared by a connection in its first message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The single trusted source of frames and detections
    Producer,
    /// Receives broadcast frames and detections
    Consumer,
}

impl Role {
    /// Read the role from a connection's first message
    ///
    /// `{"type": "producer"}` declares a producer. Anything else, including a
    /// missing field or a payload that is not JSON, is a consumer.
    pub fn from_hello(message: &Message) -> Role {
        #[derive(Deserialize)]
        struct Hello {
            #[serde(rename = "type", default)]
            kind: Option<String>,
        }

        let hello: Option<Hello> = match message {
            Message::Text(text) => serde_json::from_str(text.as_str()).ok(),
            Message::Binary(data) => serde_json::from_slice(data).ok(),
            _ => None,
        };

        match hello.and_then(|h| h.kind).as_deref() {
            Some("producer") => Role::Producer,
            _ => Role::Consumer,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Producer => "producer",
            Role::Consumer => "consumer",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handshake reply status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Connected,
    Error,
}

/// Handshake reply: `{"status": "connected"|"error", "message": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub status: ReplyStatus,
    pub message: String,
}

impl Reply {
    /// Successful admission for the given role
    pub fn connected(role: Role) -> Self {
        let message = match role {
            Role::Producer => "Producer connected successfully",
            Role::Consumer => "Consumer connected successfully",
        };
        Self {
            status: ReplyStatus::Connected,
            message: message.to_string(),
        }
    }

    /// Rejected admission
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            message: message.into(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ReplyStatus::Connected
    }

    /// Encode as a text message
    pub fn to_message(&self) -> Message {
        // Two plain string fields; serialization cannot fail.
        let json = serde_json::to_string(self).unwrap_or_default();
        Message::text(json)
    }

    /// Decode a reply received from the hub
    pub fn from_message(message: &Message) -> Option<Self> {
        match message {
            Message::Text(text) => serde_json::from_str(text.as_str()).ok(),
            Message::Binary(data) => serde_json::from_slice(data).ok(),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct OutgoingEnvelope<'a, T> {
    #[serde(rename = "type")]
    kind: &'a str,
    data: &'a T,
}

#[derive(Deserialize)]
struct IncomingEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Encode a detection event as `{"type":"detection","data":{...}}`
pub fn detection_message(event: &DetectionEvent) -> Result<Message, serde_json::Error> {
    envelope(DETECTION_TYPE, event)
}

/// Encode a sensor reading as `{"type":"sensor","data":{...}}`
pub fn sensor_message(reading: &SensorReading) -> Result<Message, serde_json::Error> {
    envelope(SENSOR_TYPE, reading)
}

fn envelope<T: Serialize>(kind: &str, data: &T) -> Result<Message, serde_json::Error> {
    let json = serde_json::to_string(&OutgoingEnvelope { kind, data })?;
    Ok(Message::text(json))
}

/// Classified inbound producer message
#[derive(Debug, Clone)]
pub enum Inbound {
    /// Encoded image frame
    Frame(Bytes),
    /// Detection event
    Detection(DetectionEvent),
    /// Sensor reading
    Sensor(SensorReading),
    /// Ping, pong, close: handled by the transport
    Control,
    /// Dropped
    Malformed(Malformed),
}

/// Why an inbound message was dropped
#[derive(Debug, Clone, PartialEq)]
pub enum Malformed {
    /// Payload looked like JSON but did not parse
    Json(String),
    /// JSON envelope with an unknown `type`
    UnknownType(String),
    /// Detection payload failed validation
    InvalidDetection(InvalidDetection),
    /// Binary payload without a recognized image header
    UnrecognizedBinary,
    /// Zero-length payload
    Empty,
}

impl std::fmt::Display for Malformed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Malformed::Json(e) => write!(f, "Unparseable JSON: {}", e),
            Malformed::UnknownType(kind) => write!(f, "Unknown message type: {}", kind),
            Malformed::InvalidDetection(e) => write!(f, "Invalid detection payload: {}", e),
            Malformed::UnrecognizedBinary => write!(f, "Binary payload is not a known image"),
            Malformed::Empty => write!(f, "Empty payload"),
        }
    }
}

/// Classify a message received from a producer or a local source
pub fn classify(message: &Message) -> Inbound {
    match message {
        Message::Text(text) => classify_json(text.as_bytes()),
        Message::Binary(data) => {
            if data.is_empty() {
                Inbound::Malformed(Malformed::Empty)
            } else if data[0] == b'{' {
                classify_json(data)
            } else if ImageFormat::sniff(data).is_some() {
                Inbound::Frame(data.clone())
            } else {
                Inbound::Malformed(Malformed::UnrecognizedBinary)
            }
        }
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_) => {
            Inbound::Control
        }
    }
}

fn classify_json(data: &[u8]) -> Inbound {
    if data.is_empty() {
        return Inbound::Malformed(Malformed::Empty);
    }

    let envelope: IncomingEnvelope = match serde_json::from_slice(data) {
        Ok(envelope) => envelope,
        Err(e) => return Inbound::Malformed(Malformed::Json(e.to_string())),
    };

    match envelope.kind.as_str() {
        DETECTION_TYPE => match serde_json::from_value::<DetectionEvent>(envelope.data) {
            Ok(event) => match event.validate() {
                Ok(()) => Inbound::Detection(event),
                Err(e) => Inbound::Malformed(Malformed::InvalidDetection(e)),
            },
            Err(e) => Inbound::Malformed(Malformed::Json(e.to_string())),
        },
        SENSOR_TYPE => match serde_json::from_value::<SensorReading>(envelope.data) {
            Ok(reading) => Inbound::Sensor(reading),
            Err(e) => Inbound::Malformed(Malformed::Json(e.to_string())),
        },
        other => Inbound::Malformed(Malformed::UnknownType(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::detection::Detection;

    const SCENARIO: &str = r#"{"type":"detection","data":{"timestamp":"2024-01-01T00:00:00Z","detections":[{"class":"person","confidence":0.92,"bbox":[0.1,0.2,0.6,0.8]}],"personDetected":true}}"#;

    #[test]
    fn test_role_from_hello() {
        assert_eq!(
            Role::from_hello(&Message::text(r#"{"type":"producer"}"#)),
            Role::Producer
        );
        assert_eq!(
            Role::from_hello(&Message::text(r#"{"type":"consumer"}"#)),
            Role::Consumer
        );
        assert_eq!(Role::from_hello(&Message::text("{}")), Role::Consumer);
        assert_eq!(
            Role::from_hello(&Message::text(r#"{"type":"admin"}"#)),
            Role::Consumer
        );
        assert_eq!(Role::from_hello(&Message::text("not json")), Role::Consumer);
        assert_eq!(
            Role::from_hello(&Message::binary(Bytes::from_static(br#"{"type":"producer"}"#))),
            Role::Producer
        );
    }

    #[test]
    fn test_reply_wire_format() {
        let reply = Reply::error("Another producer is already connected");
        let message = reply.to_message();

        let value: Value = serde_json::from_str(message.to_text().unwrap()).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["message"], "Another producer is already connected");

        assert_eq!(Reply::from_message(&message), Some(reply));
        assert!(Reply::connected(Role::Consumer).is_connected());
    }

    #[test]
    fn test_classify_detection_text() {
        match classify(&Message::text(SCENARIO)) {
            Inbound::Detection(event) => {
                assert!(event.person_detected);
                assert_eq!(event.detections[0].confidence, 0.92);
            }
            other => panic!("expected detection, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_detection_sent_as_binary() {
        let message = Message::binary(Bytes::from_static(SCENARIO.as_bytes()));
        assert!(matches!(classify(&message), Inbound::Detection(_)));
    }

    #[test]
    fn test_classify_frame() {
        let jpeg = Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xDB, 0x00, 0x43, 0x00]);
        match classify(&Message::binary(jpeg.clone())) {
            Inbound::Frame(data) => assert_eq!(data, jpeg),
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_malformed() {
        assert!(matches!(
            classify(&Message::text("{not json")),
            Inbound::Malformed(Malformed::Json(_))
        ));
        assert!(matches!(
            classify(&Message::text(r#"{"type":"status","data":{}}"#)),
            Inbound::Malformed(Malformed::UnknownType(_))
        ));
        assert!(matches!(
            classify(&Message::binary(Bytes::from_static(b"\x00\x01\x02"))),
            Inbound::Malformed(Malformed::UnrecognizedBinary)
        ));
        assert!(matches!(
            classify(&Message::binary(Bytes::new())),
            Inbound::Malformed(Malformed::Empty)
        ));

        let bad_bbox = r#"{"type":"detection","data":{"timestamp":"2024-01-01T00:00:00Z","detections":[{"class":"person","confidence":0.9,"bbox":[10,20,300,400]}],"personDetected":true}}"#;
        assert!(matches!(
            classify(&Message::text(bad_bbox)),
            Inbound::Malformed(Malformed::InvalidDetection(_))
        ));
    }

    #[test]
    fn test_classify_sensor_and_control() {
        let message = Message::text(r#"{"type":"sensor","data":{"temperature":21.0}}"#);
        match classify(&message) {
            Inbound::Sensor(reading) => assert_eq!(reading.temperature, Some(21.0)),
            other => panic!("expected sensor, got {:?}", other),
        }

        assert!(matches!(
            classify(&Message::Ping(Bytes::new())),
            Inbound::Control
        ));
    }

    #[test]
    fn test_detection_message_round_trips_through_classify() {
        let event = DetectionEvent::now(vec![Detection::new("person", 0.5, [0.0, 0.0, 1.0, 1.0])]);
        let message = detection_message(&event).unwrap();

        match classify(&message) {
            Inbound::Detection(parsed) => assert_eq!(parsed, event),
            other => panic!("expected detection, got {:?}", other),
        }
    }
}
