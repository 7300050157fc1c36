//! Detector configuration

use std::time::Duration;

/// Settings for detector selection and auto-capture
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Inference endpoint; `None` selects the fallback detector
    pub url: Option<String>,

    /// Detections below this confidence are discarded
    pub confidence_threshold: f64,

    /// Timeout for one inference request
    pub request_timeout: Duration,

    /// Timeout for the startup probe
    pub probe_timeout: Duration,

    /// Minimum spacing between two detection runs
    pub interval: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            url: None,
            confidence_threshold: 0.4,
            request_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
            interval: Duration::from_secs(2),
        }
    }
}

impl DetectorConfig {
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the confidence threshold, clamped to [0, 1]
    pub fn confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DetectorConfig::default();

        assert!(config.url.is_none());
        assert_eq!(config.confidence_threshold, 0.4);
        assert_eq!(config.interval, Duration::from_secs(2));
    }

    #[test]
    fn test_threshold_clamped() {
        assert_eq!(
            DetectorConfig::default()
                .confidence_threshold(1.5)
                .confidence_threshold,
            1.0
        );
        assert_eq!(
            DetectorConfig::default()
                .confidence_threshold(-0.1)
                .confidence_threshold,
            0.0
        );
    }
}
