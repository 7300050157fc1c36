//! Registry error types
//!
//! Error types for connection admission.

use super::connection::ConnectionId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Producer slot is already occupied
    ProducerAlreadyConnected,
    /// Producer declared from a non-local address
    ProducerNotLocal,
    /// Connection ID is already registered
    AlreadyRegistered(ConnectionId),
}

impl RegistryError {
    /// Text sent to the rejected peer
    pub fn reply_message(&self) -> &'static str {
        match self {
            RegistryError::ProducerAlreadyConnected => "Another producer is already connected",
            RegistryError::ProducerNotLocal => "Producer connections must originate from localhost",
            RegistryError::AlreadyRegistered(_) => "Connection already registered",
        }
    }
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::ProducerAlreadyConnected => {
                write!(f, "Producer slot already occupied")
            }
            RegistryError::ProducerNotLocal => write!(f, "Producer is not a local connection"),
            RegistryError::AlreadyRegistered(id) => {
                write!(f, "Connection already registered: {}", id)
            }
        }
    }
}

impl std::error::Error for RegistryError {}
