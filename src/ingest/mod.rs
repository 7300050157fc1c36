//! Producer ingestion
//!
//! Everything that enters the hub goes through one queue:
//!
//! ```text
//!   producer connection ──┐
//!   camera adapter ───────┤                    ┌──► StateCache
//!   serial adapter ───────┼──► mpsc<Ingest> ──►│ Ingestor (one task)
//!   auto-capture ─────────┘                    └──► BroadcastEngine
//! ```
//!
//! A single consumer of the queue gives a total order over frames, detection
//! events and sensor readings. The [`SourceArbiter`] decides whether producer
//! data is accepted while a local source is live.

pub mod arbiter;
pub mod pipeline;

pub use arbiter::SourceArbiter;
pub use pipeline::{
    Ingest, IngestOutcome, IngestSender, Ingestor, Origin, DEFAULT_DRAIN_TIMEOUT,
};
