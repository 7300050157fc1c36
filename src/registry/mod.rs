//! Connection registry
//!
//! The registry tracks every admitted connection and its role, and enforces
//! that at most one producer is active at any instant.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<ConnectionRegistry>
//!                   ┌───────────────────────────────┐
//!                   │ producer: Option<ConnectionId> │
//!                   │ connections: HashMap<Id,       │
//!                   │   ConnectionEntry {            │
//!                   │     role,                      │
//!                   │     outbound: mpsc::Sender,    │
//!                   │   }                            │
//!                   │ >                              │
//!                   └───────────────┬───────────────┘
//!                                   │
//!         ┌─────────────────────────┼─────────────────────────┐
//!         │                         │                         │
//!         ▼                         ▼                         ▼
//!    [Producer]               [Consumer]                [Consumer]
//!    read loop ──► ingest     writer task ◄── queue    writer task ◄── queue
//! ```
//!
//! Consumers own a bounded outbound queue drained by a single writer task, so
//! delivery to one consumer is FIFO. Producers have no outbound queue: the hub
//! never echoes data back to them.

pub mod connection;
pub mod error;
pub mod store;

pub use connection::{
    is_local_origin, ConnectionEntry, ConnectionId, ConnectionInfo, Outbound, Registration,
};
pub use error::RegistryError;
pub use store::{ConnectionRegistry, RegistryStatus};
