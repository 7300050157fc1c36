//! Periodic detection on locally captured frames

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::ingest::{Ingest, IngestSender};
use crate::protocol::{detection_message, DetectionEvent};

use super::backend::Detector;

/// Runs the detector on local frames and feeds results back to ingest
///
/// At most one run is in flight, and runs start no closer together than the
/// configured interval. Frames offered while a run is busy are skipped.
pub struct AutoCapture {
    detector: Arc<dyn Detector>,
    ingest: IngestSender,
    interval: Duration,
    last_run: Option<Instant>,
    in_flight: Arc<AtomicBool>,
}

struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl AutoCapture {
    pub fn new(detector: Arc<dyn Detector>, ingest: IngestSender, interval: Duration) -> Self {
        Self {
            detector,
            ingest,
            interval,
            last_run: None,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    /// Offer a fresh local frame; returns whether a run was started
    pub fn offer(&mut self, frame: Bytes) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_run {
            if now.duration_since(last) < self.interval {
                return false;
            }
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.last_run = Some(now);

        let guard = InFlight(Arc::clone(&self.in_flight));
        let detector = Arc::clone(&self.detector);
        let ingest = self.ingest.clone();

        tokio::spawn(async move {
            let _guard = guard;

            let detections = match detector.detect(frame).await {
                Ok(detections) => detections,
                Err(e) => {
                    tracing::warn!(detector = detector.name(), error = %e, "Detection run failed");
                    return;
                }
            };

            let event = DetectionEvent::now(detections);
            let message = match detection_message(&event) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to encode detection event");
                    return;
                }
            };

            if event.person_detected {
                tracing::info!(
                    confidence = event.best_confidence().unwrap_or(0.0),
                    "Person detected in local frame"
                );
            }

            // Receiver closes at shutdown; nothing left to do then
            let _ = ingest.send(Ingest::local(message)).await;
        });

        true
    }
}
