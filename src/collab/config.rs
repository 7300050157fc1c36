//! Collaborator API configuration

use std::time::Duration;

/// Where and how to reach the collaborating web service
#[derive(Debug, Clone)]
pub struct CollaboratorConfig {
    /// Base URL, e.g. `http://localhost:8000/api`
    pub api_url: String,

    /// Attempts per call (including the first)
    pub attempts: u32,

    /// Pause between attempts
    pub retry_delay: Duration,

    /// Timeout for image uploads
    pub upload_timeout: Duration,

    /// Timeout for JSON notifications
    pub notify_timeout: Duration,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000/api".to_string(),
            attempts: 3,
            retry_delay: Duration::from_secs(1),
            upload_timeout: Duration::from_secs(10),
            notify_timeout: Duration::from_secs(5),
        }
    }
}

impl CollaboratorConfig {
    pub fn with_url(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Default::default()
        }
    }

    /// Set attempts per call (at least one)
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    pub fn notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    /// Full URL of an endpoint under the API root, with trailing slash
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}/",
            self.api_url.trim_end_matches('/'),
            path.trim_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CollaboratorConfig::default();

        assert_eq!(config.api_url, "http://localhost:8000/api");
        assert_eq!(config.attempts, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(1));
        assert_eq!(config.upload_timeout, Duration::from_secs(10));
        assert_eq!(config.notify_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_endpoint() {
        let config = CollaboratorConfig::with_url("http://hub.local:8000/api/");
        assert_eq!(
            config.endpoint("upload-image"),
            "http://hub.local:8000/api/upload-image/"
        );
        assert_eq!(
            config.endpoint("/person-detected/"),
            "http://hub.local:8000/api/person-detected/"
        );
    }

    #[test]
    fn test_attempts_floor() {
        let config = CollaboratorConfig::default().attempts(0);
        assert_eq!(config.attempts, 1);
    }
}
