//! Statistics and metrics for the relay

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Relay-wide counters
///
/// Updated from the ingest loop, the broadcast engine and the listener;
/// read by the health supervisor.
#[derive(Debug)]
pub struct RelayStats {
    started_at: Instant,
    frames_ingested: AtomicU64,
    frame_bytes: AtomicU64,
    detections_ingested: AtomicU64,
    sensor_readings: AtomicU64,
    malformed_dropped: AtomicU64,
    producer_suppressed: AtomicU64,
    messages_delivered: AtomicU64,
    consumers_dropped: AtomicU64,
    connections_accepted: AtomicU64,
    connections_refused: AtomicU64,
    producers_rejected: AtomicU64,
}

/// Point-in-time copy of [`RelayStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub uptime: Duration,
    pub frames_ingested: u64,
    pub frame_bytes: u64,
    pub detections_ingested: u64,
    pub sensor_readings: u64,
    pub malformed_dropped: u64,
    pub producer_suppressed: u64,
    pub messages_delivered: u64,
    pub consumers_dropped: u64,
    pub connections_accepted: u64,
    pub connections_refused: u64,
    pub producers_rejected: u64,
}

impl StatsSnapshot {
    /// Average ingested frame rate since start
    pub fn frame_rate(&self) -> f64 {
        let secs = self.uptime.as_secs_f64();
        if secs > 0.0 {
            self.frames_ingested as f64 / secs
        } else {
            0.0
        }
    }

    /// Average ingest bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.uptime.as_secs();
        if secs > 0 {
            (self.frame_bytes * 8) / secs
        } else {
            0
        }
    }
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            frames_ingested: AtomicU64::new(0),
            frame_bytes: AtomicU64::new(0),
            detections_ingested: AtomicU64::new(0),
            sensor_readings: AtomicU64::new(0),
            malformed_dropped: AtomicU64::new(0),
            producer_suppressed: AtomicU64::new(0),
            messages_delivered: AtomicU64::new(0),
            consumers_dropped: AtomicU64::new(0),
            connections_accepted: AtomicU64::new(0),
            connections_refused: AtomicU64::new(0),
            producers_rejected: AtomicU64::new(0),
        }
    }

    pub fn record_frame(&self, bytes: usize) {
        self.frames_ingested.fetch_add(1, Ordering::Relaxed);
        self.frame_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_detection(&self) {
        self.detections_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sensor(&self) {
        self.sensor_readings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_suppressed(&self) {
        self.producer_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self, count: usize) {
        self.messages_delivered
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_consumers_dropped(&self, count: usize) {
        self.consumers_dropped
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_connection(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refused(&self) {
        self.connections_refused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_producer_rejected(&self) {
        self.producers_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime: self.started_at.elapsed(),
            frames_ingested: self.frames_ingested.load(Ordering::Relaxed),
            frame_bytes: self.frame_bytes.load(Ordering::Relaxed),
            detections_ingested: self.detections_ingested.load(Ordering::Relaxed),
            sensor_readings: self.sensor_readings.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
            producer_suppressed: self.producer_suppressed.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            consumers_dropped: self.consumers_dropped.load(Ordering::Relaxed),
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_refused: self.connections_refused.load(Ordering::Relaxed),
            producers_rejected: self.producers_rejected.load(Ordering::Relaxed),
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}
