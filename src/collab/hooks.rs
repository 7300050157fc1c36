//! Side effects fired from the ingest loop
//!
//! Hooks never block ingestion: each firing runs on its own task, and a
//! failure is logged and forgotten.

use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Local;
use tokio_util::task::TaskTracker;

use crate::protocol::DetectionEvent;

use super::archive::{file_stamp, ImageArchive};
use super::client::CollaboratorClient;

/// Default minimum spacing between two firings of the same hook
pub const DEFAULT_HOOK_INTERVAL: Duration = Duration::from_secs(2);

/// Reactions to person detections and PIR motion
pub struct DetectionHooks {
    client: Option<CollaboratorClient>,
    archive: Option<ImageArchive>,
    min_interval: Duration,
    last_person: Option<Instant>,
    last_motion: Option<Instant>,
    tasks: TaskTracker,
}

impl DetectionHooks {
    pub fn new(client: Option<CollaboratorClient>, archive: Option<ImageArchive>) -> Self {
        Self {
            client,
            archive,
            min_interval: DEFAULT_HOOK_INTERVAL,
            last_person: None,
            last_motion: None,
            tasks: TaskTracker::new(),
        }
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    /// True when at least one side effect is configured
    pub fn is_active(&self) -> bool {
        self.client.is_some() || self.archive.is_some()
    }

    /// Tracker for in-flight hook tasks
    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    /// React to a detection event
    ///
    /// Fires only when a person was detected, at most once per interval.
    /// Returns whether the hook fired.
    pub fn on_detection(&mut self, event: &DetectionEvent, frame: Option<Bytes>) -> bool {
        if !event.person_detected || !self.is_active() {
            return false;
        }
        if !ready(&mut self.last_person, Instant::now(), self.min_interval) {
            return false;
        }

        let client = self.client.clone();
        let archive = self.archive.clone();
        let event = event.clone();
        let at = Local::now();

        self.tasks.spawn(async move {
            let filename = format!("person_detected_{}.jpg", file_stamp(&at));

            if let (Some(archive), Some(frame)) = (&archive, &frame) {
                if let Err(e) = archive.save(frame, &event, &at).await {
                    tracing::warn!(error = %e, "Failed to save detection snapshot");
                }
            }

            if let Some(client) = client {
                let confidence = event.best_confidence().unwrap_or(0.0);
                if let Err(e) = client
                    .notify_person_detected(&event.timestamp, confidence)
                    .await
                {
                    tracing::warn!(error = %e, "Person-detected notification failed");
                }
                if let Some(frame) = frame {
                    if let Err(e) = client
                        .upload_image(frame, &filename, &event.timestamp)
                        .await
                    {
                        tracing::warn!(error = %e, "Detection image upload failed");
                    }
                }
            }
        });

        true
    }

    /// React to a PIR motion rising edge by uploading the latest frame
    pub fn on_motion(&mut self, frame: Option<Bytes>) -> bool {
        let (Some(client), Some(frame)) = (self.client.clone(), frame) else {
            return false;
        };
        if !ready(&mut self.last_motion, Instant::now(), self.min_interval) {
            return false;
        }

        let at = Local::now();
        self.tasks.spawn(async move {
            let filename = format!("motion_pir_{}.jpg", file_stamp(&at));
            match client.upload_image(frame, &filename, &at.to_rfc3339()).await {
                Ok(()) => tracing::info!(filename = %filename, "Uploaded motion snapshot"),
                Err(e) => tracing::warn!(error = %e, "Motion image upload failed"),
            }
        });

        true
    }

    /// Wait for in-flight hook tasks, up to `limit`
    pub async fn drain(&self, limit: Duration) {
        self.tasks.close();
        if tokio::time::timeout(limit, self.tasks.wait()).await.is_err() {
            tracing::warn!(
                pending = self.tasks.len(),
                "Hook tasks still running at shutdown"
            );
        }
    }
}

fn ready(last: &mut Option<Instant>, now: Instant, min_interval: Duration) -> bool {
    match *last {
        Some(previous) if now.duration_since(previous) < min_interval => false,
        _ => {
            *last = Some(now);
            true
        }
    }
}
