//! Detection event payload
//!
//! ```text
//! {
//!   "timestamp": "2024-01-01T00:00:00Z",
//!   "detections": [
//!     {"class": "person", "confidence": 0.92, "bbox": [0.1, 0.2, 0.6, 0.8]}
//!   ],
//!   "personDetected": true
//! }
//! ```
//!
//! Bounding boxes are `[x1, y1, x2, y2]` normalized to the frame size.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Class label that marks a person
pub const PERSON_CLASS: &str = "person";

/// A single recognized object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Class label (e.g. "person")
    #[serde(rename = "class")]
    pub class: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// `[x1, y1, x2, y2]`, each in [0, 1]
    pub bbox: [f64; 4],
}

impl Detection {
    pub fn new(class: impl Into<String>, confidence: f64, bbox: [f64; 4]) -> Self {
        Self {
            class: class.into(),
            confidence,
            bbox,
        }
    }

    pub fn is_person(&self) -> bool {
        self.class == PERSON_CLASS
    }
}

/// Structured report of recognized objects in one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionEvent {
    /// ISO 8601 / RFC 3339 timestamp
    pub timestamp: String,
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub person_detected: bool,
}

impl DetectionEvent {
    /// Build an event stamped with the given time
    ///
    /// `person_detected` is derived from the detections.
    pub fn new(timestamp: DateTime<Utc>, detections: Vec<Detection>) -> Self {
        let person_detected = detections.iter().any(Detection::is_person);
        Self {
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            detections,
            person_detected,
        }
    }

    /// Build an event stamped with the current time
    pub fn now(detections: Vec<Detection>) -> Self {
        Self::new(Utc::now(), detections)
    }

    /// Check the payload against the schema's value ranges
    pub fn validate(&self) -> Result<(), InvalidDetection> {
        if DateTime::parse_from_rfc3339(&self.timestamp).is_err() {
            return Err(InvalidDetection::Timestamp(self.timestamp.clone()));
        }

        for (index, detection) in self.detections.iter().enumerate() {
            if !unit_range(detection.confidence) {
                return Err(InvalidDetection::Confidence {
                    index,
                    value: detection.confidence,
                });
            }
            if !detection.bbox.iter().copied().all(unit_range) {
                return Err(InvalidDetection::BoundingBox { index });
            }
        }

        Ok(())
    }

    /// Highest-confidence person detection, if any
    pub fn best_person(&self) -> Option<&Detection> {
        self.detections
            .iter()
            .filter(|d| d.is_person())
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }

    /// Confidence reported to the history API
    ///
    /// Uses the best person detection, falling back to the best detection of
    /// any class.
    pub fn best_confidence(&self) -> Option<f64> {
        self.best_person()
            .or_else(|| {
                self.detections
                    .iter()
                    .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            })
            .map(|d| d.confidence)
    }
}

fn unit_range(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

/// Reason a detection payload was rejected
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidDetection {
    /// Timestamp is not RFC 3339
    Timestamp(String),
    /// Confidence outside [0, 1]
    Confidence { index: usize, value: f64 },
    /// Bounding box coordinate outside [0, 1]
    BoundingBox { index: usize },
}

impl std::fmt::Display for InvalidDetection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidDetection::Timestamp(ts) => write!(f, "Invalid timestamp: {}", ts),
            InvalidDetection::Confidence { index, value } => {
                write!(f, "Detection {} confidence out of range: {}", index, value)
            }
            InvalidDetection::BoundingBox { index } => {
                write!(f, "Detection {} bounding box not normalized", index)
            }
        }
    }
}

impl std::error::Error for InvalidDetection {}
