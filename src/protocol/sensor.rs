//! Sensor readings from the microcontroller line
//!
//! The board prints one JSON object per line, e.g.
//! `{"temperature":22.5,"humidity":41.0,"motionDetected":false,"smokeDetected":false}`.
//! Fields the hub does not know about are kept and relayed untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motion_detected: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smoke_detected: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SensorReading {
    /// Parse one line printed by the board
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

/// Tracks PIR motion state across readings to find rising edges
#[derive(Debug, Default)]
pub struct MotionTracker {
    last: bool,
}

impl MotionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a reading; returns true when motion just started
    ///
    /// Readings without a motion field leave the state unchanged.
    pub fn observe(&mut self, reading: &SensorReading) -> bool {
        match reading.motion_detected {
            Some(now) => {
                let rising = now && !self.last;
                self.last = now;
                rising
            }
            None => false,
        }
    }

    /// Forget the last state after the sensor line dropped
    pub fn reset(&mut self) {
        self.last = false;
    }
}
