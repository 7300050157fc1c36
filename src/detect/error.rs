//! Detector error types

/// Error type for detection runs
#[derive(Debug)]
pub enum DetectError {
    /// Transport or client error
    Http(reqwest::Error),
    /// Endpoint answered with a non-success status
    Status(u16),
    /// Response body did not match the detection schema
    Decode(String),
}

impl std::fmt::Display for DetectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectError::Http(e) => write!(f, "Detector request failed: {}", e),
            DetectError::Status(status) => write!(f, "Detector returned status {}", status),
            DetectError::Decode(msg) => write!(f, "Invalid detector response: {}", msg),
        }
    }
}

impl std::error::Error for DetectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DetectError::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for DetectError {
    fn from(e: reqwest::Error) -> Self {
        DetectError::Http(e)
    }
}
