//! Object detectors

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;

use crate::protocol::Detection;

use super::config::DetectorConfig;
use super::error::DetectError;

/// Runs object detection on one encoded frame
#[async_trait]
pub trait Detector: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Detect objects in a JPEG frame
    async fn detect(&self, frame: Bytes) -> Result<Vec<Detection>, DetectError>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Wrapped { detections: Vec<Detection> },
    Bare(Vec<Detection>),
}

impl InferenceResponse {
    fn into_detections(self) -> Vec<Detection> {
        match self {
            InferenceResponse::Wrapped { detections } | InferenceResponse::Bare(detections) => {
                detections
            }
        }
    }
}

/// Detector backed by an HTTP inference endpoint
///
/// The frame is POSTed as `image/jpeg`; the endpoint answers with either
/// `{"detections": [...]}` or a bare array in the detection schema.
#[derive(Debug, Clone)]
pub struct HttpDetector {
    http: Client,
    url: String,
    confidence_threshold: f64,
    request_timeout: Duration,
}

impl HttpDetector {
    pub fn new(
        url: impl Into<String>,
        confidence_threshold: f64,
        request_timeout: Duration,
    ) -> Result<Self, DetectError> {
        Ok(Self {
            http: Client::builder().build()?,
            url: url.into(),
            confidence_threshold,
            request_timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Check that something answers at the endpoint
    ///
    /// Any HTTP response counts; only transport failures mean unavailable.
    pub async fn probe(&self, timeout: Duration) -> Result<(), DetectError> {
        self.http.get(&self.url).timeout(timeout).send().await?;
        Ok(())
    }

    fn accept(&self, detections: Vec<Detection>) -> Vec<Detection> {
        detections
            .into_iter()
            .filter(|d| d.confidence.is_finite() && d.confidence >= self.confidence_threshold)
            .map(|mut d| {
                d.confidence = d.confidence.clamp(0.0, 1.0);
                for v in d.bbox.iter_mut() {
                    *v = if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
                }
                d
            })
            .collect()
    }
}

#[async_trait]
impl Detector for HttpDetector {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn detect(&self, frame: Bytes) -> Result<Vec<Detection>, DetectError> {
        let response = self
            .http
            .post(&self.url)
            .timeout(self.request_timeout)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(frame)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DetectError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let parsed: InferenceResponse =
            serde_json::from_slice(&body).map_err(|e| DetectError::Decode(e.to_string()))?;

        Ok(self.accept(parsed.into_detections()))
    }
}

/// Detector used when no inference endpoint is reachable
///
/// Reports nothing, so auto-capture keeps publishing empty events and the
/// relay stays up without a model.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassiveDetector;

#[async_trait]
impl Detector for PassiveDetector {
    fn name(&self) -> &'static str {
        "passive"
    }

    async fn detect(&self, _frame: Bytes) -> Result<Vec<Detection>, DetectError> {
        Ok(Vec::new())
    }
}

/// The detector chosen at startup
#[derive(Debug, Clone)]
pub enum DetectorBackend {
    Primary(HttpDetector),
    Fallback(PassiveDetector),
}

impl DetectorBackend {
    /// Pick the primary detector if configured and reachable, else the fallback
    ///
    /// Runs once; the choice is not revisited per frame.
    pub async fn select(config: &DetectorConfig) -> Self {
        let Some(ref url) = config.url else {
            tracing::info!("No detector endpoint configured, using fallback detector");
            return DetectorBackend::Fallback(PassiveDetector);
        };

        let detector = match HttpDetector::new(
            url.clone(),
            config.confidence_threshold,
            config.request_timeout,
        ) {
            Ok(detector) => detector,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build detector client, using fallback");
                return DetectorBackend::Fallback(PassiveDetector);
            }
        };

        match detector.probe(config.probe_timeout).await {
            Ok(()) => {
                tracing::info!(url = %url, "Using primary detector");
                DetectorBackend::Primary(detector)
            }
            Err(e) => {
                tracing::warn!(
                    url = %url,
                    error = %e,
                    "Detector endpoint unavailable, using fallback detector"
                );
                DetectorBackend::Fallback(PassiveDetector)
            }
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, DetectorBackend::Primary(_))
    }
}

#[async_trait]
impl Detector for DetectorBackend {
    fn name(&self) -> &'static str {
        match self {
            DetectorBackend::Primary(d) => d.name(),
            DetectorBackend::Fallback(d) => d.name(),
        }
    }

    async fn detect(&self, frame: Bytes) -> Result<Vec<Detection>, DetectError> {
        match self {
            DetectorBackend::Primary(d) => d.detect(frame).await,
            DetectorBackend::Fallback(d) => d.detect(frame).await,
        }
    }
}
