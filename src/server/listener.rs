//! Hub listener
//!
//! Binds the WebSocket port (with retry), runs the TCP accept loop and spawns
//! one tracked task per connection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

use crate::error::{Error, Result};
use crate::registry::ConnectionId;
use crate::server::config::HubConfig;
use crate::server::connection::{Connection, ConnectionContext};
use crate::source::Backoff;

/// Bind the configured address, retrying with backoff
///
/// Gives up with [`Error::Bind`] after `bind_attempts` failures.
pub async fn bind_with_retry(config: &HubConfig) -> Result<TcpListener> {
    let mut backoff = Backoff::new(config.bind_backoff_floor, config.bind_backoff_ceiling);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match TcpListener::bind(config.bind_addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) if attempt >= config.bind_attempts => {
                tracing::error!(
                    addr = %config.bind_addr,
                    attempts = attempt,
                    error = %e,
                    "Giving up binding listener"
                );
                return Err(Error::Bind {
                    addr: config.bind_addr,
                    attempts: attempt,
                    source: e,
                });
            }
            Err(e) => {
                let delay = backoff.fail();
                tracing::error!(
                    addr = %config.bind_addr,
                    attempt = attempt,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Failed to bind listener"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Relay hub server
pub struct RelayServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    ctx: ConnectionContext,
    next_connection_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
    tasks: TaskTracker,
}

impl RelayServer {
    /// Wrap a bound listener
    pub fn new(listener: TcpListener, ctx: ConnectionContext) -> Result<Self> {
        let local_addr = listener.local_addr()?;
        let connection_semaphore = if ctx.config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(ctx.config.max_connections)))
        } else {
            None
        };

        Ok(Self {
            listener,
            local_addr,
            ctx,
            next_connection_id: AtomicU64::new(1),
            connection_semaphore,
            tasks: TaskTracker::new(),
        })
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Tracker holding every connection task
    pub fn tasks(&self) -> TaskTracker {
        self.tasks.clone()
    }

    /// Accept connections until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tracing::info!(addr = %self.local_addr, "Relay hub listening");

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Stopped accepting connections");
                Ok(())
            }
            result = self.accept_loop() => result,
        };

        self.tasks.close();
        result
    }

    async fn accept_loop(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    self.ctx.stats.record_refused();
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let id = ConnectionId(self.next_connection_id.fetch_add(1, Ordering::Relaxed));
        self.ctx.stats.record_connection();
        tracing::info!(conn = %id, peer = %peer_addr, "Connection accepted");

        if let Err(e) = socket.set_nodelay(true) {
            tracing::debug!(conn = %id, error = %e, "Failed to set TCP_NODELAY");
        }

        let ctx = self.ctx.clone();
        self.tasks.spawn(async move {
            let _permit = permit;
            let connection = Connection::new(id, socket, peer_addr, ctx);

            if let Err(e) = connection.run().await {
                tracing::debug!(conn = %id, error = %e, "Connection error");
            }

            tracing::debug!(conn = %id, "Connection closed");
        });
    }
}
