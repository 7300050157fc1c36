//! Crate-level error type

use std::net::SocketAddr;

use tokio_tungstenite::tungstenite;

use crate::collab::CollaboratorError;
use crate::detect::DetectError;
use crate::registry::RegistryError;
use crate::source::SourceError;

/// Result alias used across the hub
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for hub operations
#[derive(Debug)]
pub enum Error {
    /// Socket or filesystem I/O
    Io(std::io::Error),
    /// WebSocket protocol failure
    WebSocket(tungstenite::Error),
    /// JSON encoding or decoding
    Json(serde_json::Error),
    /// Connection admission refused
    Registry(RegistryError),
    /// Local capture source
    Source(SourceError),
    /// Collaborator API
    Collaborator(CollaboratorError),
    /// Detector backend
    Detect(DetectError),
    /// Listening socket could not be bound
    Bind {
        addr: SocketAddr,
        attempts: u32,
        source: std::io::Error,
    },
    /// WebSocket upgrade or hello message did not complete
    Handshake(String),
    /// Peer refused by the hub
    Rejected(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::WebSocket(e) => write!(f, "WebSocket error: {}", e),
            Error::Json(e) => write!(f, "JSON error: {}", e),
            Error::Registry(e) => write!(f, "Registry error: {}", e),
            Error::Source(e) => write!(f, "Source error: {}", e),
            Error::Collaborator(e) => write!(f, "Collaborator error: {}", e),
            Error::Detect(e) => write!(f, "Detector error: {}", e),
            Error::Bind {
                addr,
                attempts,
                source,
            } => write!(
                f,
                "Failed to bind {} after {} attempts: {}",
                addr, attempts, source
            ),
            Error::Handshake(msg) => write!(f, "Handshake failed: {}", msg),
            Error::Rejected(msg) => write!(f, "Rejected: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::WebSocket(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Registry(e) => Some(e),
            Error::Source(e) => Some(e),
            Error::Collaborator(e) => Some(e),
            Error::Detect(e) => Some(e),
            Error::Bind { source, .. } => Some(source),
            Error::Handshake(_) | Error::Rejected(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<tungstenite::Error> for Error {
    fn from(e: tungstenite::Error) -> Self {
        Error::WebSocket(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}

impl From<SourceError> for Error {
    fn from(e: SourceError) -> Self {
        Error::Source(e)
    }
}

impl From<CollaboratorError> for Error {
    fn from(e: CollaboratorError) -> Self {
        Error::Collaborator(e)
    }
}

impl From<DetectError> for Error {
    fn from(e: DetectError) -> Self {
        Error::Detect(e)
    }
}
