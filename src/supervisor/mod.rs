//! Lifecycle and health supervision

pub mod health;
pub mod shutdown;

pub use health::{HealthStatus, HealthSupervisor, DEFAULT_HEALTH_INTERVAL};
pub use shutdown::shutdown_signal;
