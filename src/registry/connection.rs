//! Connection identity types
//!
//! This module defines the per-connection data stored in the registry.

use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::Role;

/// Queue feeding one consumer's socket writer
pub type Outbound = mpsc::Sender<Message>;

/// Unique identifier for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Immutable facts about a connection, captured at accept time
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Connection ID
    pub id: ConnectionId,
    /// Remote peer address
    pub peer_addr: SocketAddr,
    /// Whether the peer is on this host (required for producers)
    pub is_local: bool,
    /// Accept time
    pub connected_at: Instant,
}

impl ConnectionInfo {
    pub fn new(id: ConnectionId, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            is_local: is_local_origin(peer_addr.ip()),
            connected_at: Instant::now(),
        }
    }
}

/// Loopback check that also accepts IPv4-mapped IPv6 loopback
pub fn is_local_origin(ip: IpAddr) -> bool {
    ip.to_canonical().is_loopback()
}

/// What a connection asks to be registered as
#[derive(Debug)]
pub enum Registration {
    /// Claim the producer slot
    Producer,
    /// Join the broadcast set with the given outbound queue
    Consumer { outbound: Outbound },
}

impl Registration {
    pub fn role(&self) -> Role {
        match self {
            Registration::Producer => Role::Producer,
            Registration::Consumer { .. } => Role::Consumer,
        }
    }
}

/// Entry for a single registered connection
#[derive(Debug)]
pub struct ConnectionEntry {
    pub info: ConnectionInfo,
    pub role: Role,
    /// Present for consumers only
    pub(super) outbound: Option<Outbound>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_local_origin() {
        assert!(is_local_origin(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert!(is_local_origin(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(is_local_origin(IpAddr::V6(
            Ipv4Addr::LOCALHOST.to_ipv6_mapped()
        )));
        assert!(!is_local_origin(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))));
    }

    #[test]
    fn test_connection_info() {
        let addr: SocketAddr = "127.0.0.1:50000".parse().unwrap();
        let info = ConnectionInfo::new(ConnectionId(7), addr);

        assert!(info.is_local);
        assert_eq!(info.id.to_string(), "conn-7");
    }

    #[test]
    fn test_registration_role() {
        let (tx, _rx) = mpsc::channel(1);
        assert_eq!(Registration::Producer.role(), Role::Producer);
        assert_eq!(
            Registration::Consumer { outbound: tx }.role(),
            Role::Consumer
        );
    }
}
