//! Object detection on local frames
//!
//! One detector is chosen at startup:
//!
//! ```text
//!   DetectorBackend::select(config)
//!       │
//!       ├── url configured and probe answers ──► Primary(HttpDetector)
//!       └── otherwise ─────────────────────────► Fallback(PassiveDetector)
//! ```
//!
//! [`AutoCapture`] drives it from the ingest loop and publishes the results
//! as ordinary detection events.

pub mod auto;
pub mod backend;
pub mod config;
pub mod error;

pub use auto::AutoCapture;
pub use backend::{Detector, DetectorBackend, HttpDetector, PassiveDetector};
pub use config::DetectorConfig;
pub use error::DetectError;
