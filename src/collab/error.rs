//! Collaborator error types

/// Error type for calls to the collaborating service and the local archive
#[derive(Debug)]
pub enum CollaboratorError {
    /// Transport or client error
    Http(reqwest::Error),
    /// Service answered with a non-success status
    Status { endpoint: String, status: u16 },
    /// Archive I/O error
    Io(std::io::Error),
    /// Metadata encoding error
    Json(serde_json::Error),
}

impl std::fmt::Display for CollaboratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollaboratorError::Http(e) => write!(f, "HTTP error: {}", e),
            CollaboratorError::Status { endpoint, status } => {
                write!(f, "{} returned status {}", endpoint, status)
            }
            CollaboratorError::Io(e) => write!(f, "Archive I/O error: {}", e),
            CollaboratorError::Json(e) => write!(f, "Metadata encoding error: {}", e),
        }
    }
}

impl std::error::Error for CollaboratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollaboratorError::Http(e) => Some(e),
            CollaboratorError::Io(e) => Some(e),
            CollaboratorError::Json(e) => Some(e),
            CollaboratorError::Status { .. } => None,
        }
    }
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(e: reqwest::Error) -> Self {
        CollaboratorError::Http(e)
    }
}

impl From<std::io::Error> for CollaboratorError {
    fn from(e: std::io::Error) -> Self {
        CollaboratorError::Io(e)
    }
}

impl From<serde_json::Error> for CollaboratorError {
    fn from(e: serde_json::Error) -> Self {
        CollaboratorError::Json(e)
    }
}
