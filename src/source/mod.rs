//! Local upstream sources
//!
//! A source lets the hub capture data itself instead of waiting for a
//! producer connection:
//!
//! - [`CameraSource`]: a camera device read through ffmpeg as MJPEG.
//! - [`SerialSource`]: the sensor board's newline-delimited JSON.
//!
//! Each runs inside a [`SourceAdapter`], which owns reconnection and feeds
//! the ingest queue.

pub mod adapter;
pub mod backoff;
pub mod camera;
pub mod error;
pub mod mjpeg;
pub mod serial;

pub use adapter::{
    AdapterState, SourceAdapter, SourceHandle, SourceItem, SourceKind, UpstreamSource,
    DEFAULT_BACKOFF_CEILING, DEFAULT_BACKOFF_FLOOR, DEFAULT_MAX_READ_FAILURES,
};
pub use backoff::Backoff;
pub use camera::{CameraConfig, CameraSource};
pub use error::SourceError;
pub use mjpeg::MjpegSplitter;
pub use serial::{discover_port, match_port, LineReader, SerialConfig, SerialSource};
