//! Collaborating web service and local snapshot archive
//!
//! The hub calls out to the dashboard's API opportunistically:
//!
//! ```text
//!   person detected ──► ImageArchive::save      (save-detection-images)
//!                   ──► POST {api}/person-detected/
//!                   ──► POST {api}/upload-image/
//!
//!   PIR rising edge ──► POST {api}/upload-image/   (motion_pir_<stamp>.jpg)
//! ```
//!
//! None of this is on the relay's data path. Failures are logged and
//! dropped.

pub mod archive;
pub mod client;
pub mod config;
pub mod error;
pub mod hooks;

pub use archive::{file_stamp, ImageArchive, SavedSnapshot};
pub use client::CollaboratorClient;
pub use config::CollaboratorConfig;
pub use error::CollaboratorError;
pub use hooks::{DetectionHooks, DEFAULT_HOOK_INTERVAL};
