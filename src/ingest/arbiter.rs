//! Local source versus producer priority

use std::sync::atomic::{AtomicBool, Ordering};

/// Decides whose data is accepted when both a local source and a producer
/// are supplying it
///
/// The local camera wins while it is connected. Producer detections are only
/// displaced when the hub is also running detection on the local frames.
#[derive(Debug)]
pub struct SourceArbiter {
    local_detection_enabled: bool,
    local_frames: AtomicBool,
    local_detections: AtomicBool,
}

impl SourceArbiter {
    /// `local_detection_enabled` is true when auto-capture runs on local frames
    pub fn new(local_detection_enabled: bool) -> Self {
        Self {
            local_detection_enabled,
            local_frames: AtomicBool::new(false),
            local_detections: AtomicBool::new(false),
        }
    }

    /// Called by the camera adapter on connect and disconnect
    pub fn set_local_frames(&self, active: bool) {
        self.local_frames.store(active, Ordering::Release);
        self.local_detections
            .store(active && self.local_detection_enabled, Ordering::Release);
    }

    pub fn local_frames_active(&self) -> bool {
        self.local_frames.load(Ordering::Acquire)
    }

    pub fn local_detections_active(&self) -> bool {
        self.local_detections.load(Ordering::Acquire)
    }
}

impl Default for SourceArbiter {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_accepts_producer() {
        let arbiter = SourceArbiter::new(true);
        assert!(!arbiter.local_frames_active());
        assert!(!arbiter.local_detections_active());
    }

    #[test]
    fn test_local_frames_without_detection() {
        let arbiter = SourceArbiter::new(false);
        arbiter.set_local_frames(true);

        assert!(arbiter.local_frames_active());
        assert!(!arbiter.local_detections_active());
    }

    #[test]
    fn test_local_source_drop_restores_producer() {
        let arbiter = SourceArbiter::new(true);
        arbiter.set_local_frames(true);
        assert!(arbiter.local_detections_active());

        arbiter.set_local_frames(false);
        assert!(!arbiter.local_frames_active());
        assert!(!arbiter.local_detections_active());
    }
}
