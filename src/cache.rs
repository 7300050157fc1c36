//! Latest-state cache for late joiners
//!
//! A consumer that connects mid-stream should not start blank. The cache
//! keeps the most recent frame, detection event and sensor reading, and
//! replays them to each new consumer before it sees live traffic.
//!
//! Everything is last-write-wins: no history is retained.

use std::sync::{PoisonError, RwLock};
use std::time::Instant;

use bytes::Bytes;
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::{DetectionEvent, SensorReading};

/// Latest detection, with the exact message it arrived in
#[derive(Debug, Clone)]
pub struct CachedDetection {
    pub event: DetectionEvent,
    pub message: Message,
}

/// Latest sensor reading, with the message that was broadcast for it
#[derive(Debug, Clone)]
pub struct CachedSensor {
    pub reading: SensorReading,
    pub message: Message,
}

/// Copy of the cache contents
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    pub frame: Option<Bytes>,
    pub detection: Option<CachedDetection>,
    pub sensor: Option<CachedSensor>,
    /// When the frame was last replaced
    pub frame_updated_at: Option<Instant>,
}

impl CacheSnapshot {
    /// Messages to send a new consumer: frame, then detection, then sensor
    pub fn replay_messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(3);

        if let Some(ref frame) = self.frame {
            messages.push(Message::binary(frame.clone()));
        }
        if let Some(ref detection) = self.detection {
            messages.push(detection.message.clone());
        }
        if let Some(ref sensor) = self.sensor {
            messages.push(sensor.message.clone());
        }

        messages
    }
}

/// Shared latest-state cache
///
/// Mutated only by the ingest loop. Reads happen on consumer join, inside
/// the registry's critical section, so the lock here is a short synchronous
/// one and is never held across an await.
#[derive(Debug, Default)]
pub struct StateCache {
    inner: RwLock<CacheSnapshot>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the latest frame
    pub fn update_frame(&self, frame: Bytes) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.frame = Some(frame);
        inner.frame_updated_at = Some(Instant::now());
    }

    /// Replace the latest detection event
    pub fn update_detection(&self, event: DetectionEvent, message: Message) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.detection = Some(CachedDetection { event, message });
    }

    /// Replace the latest sensor reading
    pub fn update_sensor(&self, reading: SensorReading, message: Message) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.sensor = Some(CachedSensor { reading, message });
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> CacheSnapshot {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Latest frame only
    pub fn latest_frame(&self) -> Option<Bytes> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .frame
            .clone()
    }

    /// Messages to replay to a newly joined consumer
    pub fn replay_messages(&self) -> Vec<Message> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .replay_messages()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{detection_message, Detection};

    fn jpeg(tag: u8) -> Bytes {
        Bytes::from(vec![0xFF, 0xD8, 0xFF, tag])
    }

    #[test]
    fn test_empty_cache() {
        let cache = StateCache::new();
        let snapshot = cache.snapshot();

        assert!(snapshot.frame.is_none());
        assert!(snapshot.detection.is_none());
        assert!(cache.replay_messages().is_empty());
    }

    #[test]
    fn test_last_write_wins() {
        let cache = StateCache::new();

        cache.update_frame(jpeg(1));
        cache.update_frame(jpeg(2));

        assert_eq!(cache.latest_frame(), Some(jpeg(2)));
        assert!(cache.snapshot().frame_updated_at.is_some());
    }

    #[test]
    fn test_replay_order() {
        let cache = StateCache::new();
        let event = DetectionEvent::now(vec![Detection::new("person", 0.9, [0.1, 0.1, 0.5, 0.5])]);
        let detection = detection_message(&event).unwrap();
        let sensor = Message::text(r#"{"type":"sensor","data":{"humidity":40.0}}"#);

        // Insert out of order; replay order is fixed
        cache.update_sensor(
            SensorReading {
                humidity: Some(40.0),
                ..Default::default()
            },
            sensor.clone(),
        );
        cache.update_detection(event.clone(), detection.clone());
        cache.update_frame(jpeg(7));

        let messages = cache.replay_messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], Message::binary(jpeg(7)));
        assert_eq!(messages[1], detection);
        assert_eq!(messages[2], sensor);

        assert_eq!(cache.snapshot().detection.unwrap().event, event);
    }
}
