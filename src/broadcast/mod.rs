//! Broadcast engine
//!
//! Every accepted frame, detection event and sensor reading passes through
//! [`BroadcastEngine::broadcast`] on its way to consumers.
//!
//! ```text
//!   ingest loop
//!       │ broadcast(msg)
//!       ▼
//!   consumer_targets() ──► join_all([
//!                             timeout(send_timeout, queue₁.send(msg)),
//!                             timeout(send_timeout, queue₂.send(msg)),
//!                             ...
//!                          ])
//!                                 │
//!                                 ▼
//!                          unregister(failed)
//! ```
//!
//! The queue is the only thing a send waits on. Each queue is drained by the
//! consumer's own writer task, so a slow socket stalls its queue and nothing
//! else.

pub mod engine;

pub use engine::{BroadcastEngine, BroadcastReport, DEFAULT_SEND_TIMEOUT};
