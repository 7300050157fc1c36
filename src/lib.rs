//! Camera frame and sensor event relay hub
//!
//! One trusted producer (a local capture process, or the hub's own camera and
//! serial adapters) feeds frames, detection events and sensor readings into
//! the hub; every connected consumer receives them over a WebSocket.
//!
//! # Architecture
//!
//! ```text
//!   ┌────────────┐   ┌────────────┐
//!   │  Camera    │   │  Serial    │     Upstream sources (reconnect with backoff)
//!   └─────┬──────┘   └─────┬──────┘
//!         └───────┬────────┘
//!                 ▼
//!   Producer ──► ingest queue ──► Ingestor ──► StateCache (latest frame,
//!   (WebSocket)                      │          detection, sensor)
//!                                    ▼
//!                             BroadcastEngine ──► ConnectionRegistry
//!                                    │
//!                    ┌───────────────┼───────────────┐
//!                    ▼               ▼               ▼
//!                Consumer        Consumer        Consumer
//! ```
//!
//! - At most one producer holds the producer slot, and only from localhost
//! - A new consumer receives the cached state before any live broadcast
//! - A slow or dead consumer is dropped after the send timeout without
//!   delaying the others
//!
//! # Example
//!
//! ```no_run
//! use homecam_relay::{Hub, HubConfig, shutdown_signal};
//!
//! # async fn example() -> homecam_relay::Result<()> {
//! let hub = Hub::start(HubConfig::default()).await?;
//! hub.run_until(shutdown_signal()).await;
//! # Ok(())
//! # }
//! ```

pub mod broadcast;
pub mod cache;
pub mod client;
pub mod collab;
pub mod detect;
pub mod error;
pub mod hub;
pub mod ingest;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod source;
pub mod stats;
pub mod supervisor;

pub use cache::StateCache;
pub use error::{Error, Result};
pub use hub::{Hub, RunningHub};
pub use registry::ConnectionRegistry;
pub use server::HubConfig;
pub use supervisor::shutdown_signal;
