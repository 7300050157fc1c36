//! Upstream source error types

use std::time::Duration;

/// Error type for local capture sources
#[derive(Debug)]
pub enum SourceError {
    /// No matching device found
    NoDevice(String),
    /// Device exists but could not be opened
    Open(String),
    /// Read from an open device failed
    Read(std::io::Error),
    /// Capture program could not be started
    Spawn(std::io::Error),
    /// Frame exceeded the size limit
    OversizedFrame { size: usize, limit: usize },
    /// No data within the allowed time
    Timeout(Duration),
    /// Serial port layer error
    Serial(tokio_serial::Error),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::NoDevice(what) => write!(f, "No device found: {}", what),
            SourceError::Open(msg) => write!(f, "Failed to open device: {}", msg),
            SourceError::Read(e) => write!(f, "Read failed: {}", e),
            SourceError::Spawn(e) => write!(f, "Failed to start capture program: {}", e),
            SourceError::OversizedFrame { size, limit } => {
                write!(f, "Frame too large: {} bytes (limit {})", size, limit)
            }
            SourceError::Timeout(after) => write!(f, "No data after {:?}", after),
            SourceError::Serial(e) => write!(f, "Serial error: {}", e),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SourceError::Read(e) | SourceError::Spawn(e) => Some(e),
            SourceError::Serial(e) => Some(e),
            _ => None,
        }
    }
}

impl From<tokio_serial::Error> for SourceError {
    fn from(e: tokio_serial::Error) -> Self {
        SourceError::Serial(e)
    }
}
