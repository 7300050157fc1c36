//! On-disk archive of person-detection snapshots

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use serde::Serialize;

use crate::protocol::DetectionEvent;

use super::error::CollaboratorError;

/// Files written for one detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedSnapshot {
    pub filename: String,
    pub image_path: PathBuf,
    pub metadata_path: PathBuf,
}

#[derive(Serialize)]
struct SnapshotMetadata<'a> {
    timestamp: &'a str,
    confidence: Option<f64>,
    bbox: Option<[f64; 4]>,
    detection_time: String,
    filename: &'a str,
}

/// Compact local-time stamp used in archive and upload file names
pub fn file_stamp<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// Writes `person_detected_<stamp>.jpg` and a metadata sidecar per detection
#[derive(Debug, Clone)]
pub struct ImageArchive {
    dir: PathBuf,
}

impl ImageArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save a frame and the detection that triggered it
    ///
    /// The directory is created on first use.
    pub async fn save<Tz>(
        &self,
        frame: &[u8],
        event: &DetectionEvent,
        at: &DateTime<Tz>,
    ) -> Result<SavedSnapshot, CollaboratorError>
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        tokio::fs::create_dir_all(&self.dir).await?;

        let stem = format!("person_detected_{}", file_stamp(at));
        let filename = format!("{}.jpg", stem);
        let image_path = self.dir.join(&filename);
        let metadata_path = self.dir.join(format!("{}_metadata.json", stem));

        let best = event.best_person();
        let metadata = SnapshotMetadata {
            timestamp: &event.timestamp,
            confidence: best.map(|d| d.confidence),
            bbox: best.map(|d| d.bbox),
            detection_time: at.to_rfc3339(),
            filename: &filename,
        };
        let metadata_json = serde_json::to_vec_pretty(&metadata)?;

        tokio::fs::write(&image_path, frame).await?;
        tokio::fs::write(&metadata_path, metadata_json).await?;

        tracing::info!(path = %image_path.display(), "Saved detection snapshot");

        Ok(SavedSnapshot {
            filename,
            image_path,
            metadata_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::protocol::Detection;

    fn event() -> DetectionEvent {
        let at = "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        DetectionEvent::new(
            at,
            vec![
                Detection::new("person", 0.61, [0.0, 0.0, 0.2, 0.2]),
                Detection::new("person", 0.92, [0.1, 0.2, 0.6, 0.8]),
                Detection::new("dog", 0.99, [0.5, 0.5, 0.9, 0.9]),
            ],
        )
    }

    #[test]
    fn test_file_stamp() {
        let at = "2024-03-05T07:08:09Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(file_stamp(&at), "20240305_070809");
    }

    #[tokio::test]
    async fn test_save_writes_image_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let archive = ImageArchive::new(dir.path().join("captured_images"));
        let at = "2024-01-01T00:00:05Z".parse::<DateTime<Utc>>().unwrap();
        let frame = [0xFF, 0xD8, 0xFF, 0xD9];

        let saved = archive.save(&frame, &event(), &at).await.unwrap();

        assert_eq!(saved.filename, "person_detected_20240101_000005.jpg");
        assert_eq!(std::fs::read(&saved.image_path).unwrap(), frame);

        let metadata: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&saved.metadata_path).unwrap()).unwrap();
        assert_eq!(metadata["timestamp"], "2024-01-01T00:00:00.000Z");
        assert_eq!(metadata["confidence"], 0.92);
        assert_eq!(metadata["bbox"], serde_json::json!([0.1, 0.2, 0.6, 0.8]));
        assert_eq!(metadata["filename"], "person_detected_20240101_000005.jpg");
        assert!(saved
            .metadata_path
            .ends_with("person_detected_20240101_000005_metadata.json"));
    }
}
