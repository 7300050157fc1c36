//! Connection registry implementation
//!
//! The central registry that tracks every admitted connection and owns the
//! single producer slot.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::Role;

use super::connection::{ConnectionEntry, ConnectionId, ConnectionInfo, Outbound, Registration};
use super::error::RegistryError;

#[derive(Default)]
struct RegistryInner {
    /// Current producer, if any
    producer: Option<ConnectionId>,
    /// All admitted connections
    connections: HashMap<ConnectionId, ConnectionEntry>,
}

/// Point-in-time view of the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStatus {
    pub consumers: usize,
    pub producer: Option<ConnectionId>,
}

/// Registry of active connections
///
/// Every mutation takes the write lock, so the producer admission check and
/// the slot assignment happen in one critical section. Two handshakes racing
/// for the slot cannot both win.
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Admit a connection
    ///
    /// Consumers are always admitted. A producer is admitted only if it is
    /// local and the producer slot is empty; on success it occupies the slot.
    pub async fn register(
        &self,
        info: ConnectionInfo,
        registration: Registration,
    ) -> Result<(), RegistryError> {
        self.register_with(info, registration, Vec::new).await
    }

    /// Admit a connection, queueing `replay` for a consumer before it joins
    ///
    /// `replay` runs while the registry is locked, and its messages are queued
    /// on the consumer's fresh outbound channel. Any broadcast that starts
    /// after this call can only be queued behind them.
    pub async fn register_with<F>(
        &self,
        info: ConnectionInfo,
        registration: Registration,
        replay: F,
    ) -> Result<(), RegistryError>
    where
        F: FnOnce() -> Vec<Message>,
    {
        let mut inner = self.inner.write().await;

        if inner.connections.contains_key(&info.id) {
            return Err(RegistryError::AlreadyRegistered(info.id));
        }

        match registration {
            Registration::Producer => {
                if !info.is_local {
                    return Err(RegistryError::ProducerNotLocal);
                }
                if let Some(current) = inner.producer {
                    tracing::debug!(
                        conn = %info.id,
                        producer = %current,
                        "Producer slot occupied"
                    );
                    return Err(RegistryError::ProducerAlreadyConnected);
                }

                inner.producer = Some(info.id);
                tracing::info!(
                    conn = %info.id,
                    peer = %info.peer_addr,
                    "Producer registered"
                );

                inner.connections.insert(
                    info.id,
                    ConnectionEntry {
                        info,
                        role: Role::Producer,
                        outbound: None,
                    },
                );
            }
            Registration::Consumer { outbound } => {
                let messages = replay();
                let total = messages.len();
                let mut queued = 0;
                for message in messages {
                    if outbound.try_send(message).is_err() {
                        break;
                    }
                    queued += 1;
                }
                if queued < total {
                    tracing::debug!(
                        conn = %info.id,
                        queued = queued,
                        total = total,
                        "Outbound queue too small for initial state"
                    );
                }

                let id = info.id;
                let peer = info.peer_addr;
                inner.connections.insert(
                    id,
                    ConnectionEntry {
                        info,
                        role: Role::Consumer,
                        outbound: Some(outbound),
                    },
                );

                tracing::info!(
                    conn = %id,
                    peer = %peer,
                    consumers = count_consumers(&inner),
                    replayed = queued,
                    "Consumer registered"
                );
            }
        }

        Ok(())
    }

    /// Remove a connection
    ///
    /// Clears the producer slot if the connection held it. Returns the role
    /// the connection had, or `None` if it was not registered.
    pub async fn unregister(&self, id: ConnectionId) -> Option<Role> {
        let mut inner = self.inner.write().await;

        let entry = inner.connections.remove(&id)?;
        if inner.producer == Some(id) {
            inner.producer = None;
            tracing::info!(conn = %id, "Producer unregistered");
        } else {
            tracing::debug!(
                conn = %id,
                consumers = count_consumers(&inner),
                "Consumer unregistered"
            );
        }

        Some(entry.role)
    }

    /// Outbound queues of every consumer except `excluding`
    pub async fn consumer_targets(
        &self,
        excluding: Option<ConnectionId>,
    ) -> Vec<(ConnectionId, Outbound)> {
        let inner = self.inner.read().await;

        inner
            .connections
            .values()
            .filter(|entry| Some(entry.info.id) != excluding)
            .filter_map(|entry| entry.outbound.as_ref().map(|tx| (entry.info.id, tx.clone())))
            .collect()
    }

    /// Number of registered consumers
    pub async fn consumer_count(&self) -> usize {
        count_consumers(&*self.inner.read().await)
    }

    /// Check if the producer slot is occupied
    pub async fn has_producer(&self) -> bool {
        self.inner.read().await.producer.is_some()
    }

    /// Current producer, if any
    pub async fn producer_id(&self) -> Option<ConnectionId> {
        self.inner.read().await.producer
    }

    /// Role of a registered connection
    pub async fn role_of(&self, id: ConnectionId) -> Option<Role> {
        self.inner.read().await.connections.get(&id).map(|e| e.role)
    }

    /// Consumer count and producer in one read
    pub async fn status(&self) -> RegistryStatus {
        let inner = self.inner.read().await;
        RegistryStatus {
            consumers: count_consumers(&inner),
            producer: inner.producer,
        }
    }

    /// Drop every connection and empty the producer slot
    ///
    /// Dropping the outbound senders ends each consumer's writer, which closes
    /// its socket. Returns the number of connections removed.
    pub async fn close_all(&self) -> usize {
        let mut inner = self.inner.write().await;
        let removed = inner.connections.len();
        inner.connections.clear();
        inner.producer = None;

        tracing::info!(connections = removed, "Registry closed all connections");
        removed
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn count_consumers(inner: &RegistryInner) -> usize {
    inner
        .connections
        .values()
        .filter(|e| e.role == Role::Consumer)
        .count()
}
