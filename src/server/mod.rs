//! Hub network boundary
//!
//! The listener accepts TCP connections and hands each one to a
//! [`Connection`] task that upgrades it to a WebSocket, reads the hello
//! message and serves the declared role.

pub mod config;
pub mod connection;
pub mod listener;

pub use config::{HubConfig, DEFAULT_PORT, MIN_OUTBOUND_QUEUE};
pub use connection::{Connection, ConnectionContext};
pub use listener::{bind_with_retry, RelayServer};
