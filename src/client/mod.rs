//! Hub client implementation
//!
//! Provides the client side of the relay protocol for:
//! - Capture processes publishing frames and detections as the producer
//! - Dashboards and tools receiving the broadcast as consumers

pub mod connector;
pub mod consumer;
pub mod producer;

pub use connector::DEFAULT_REPLY_TIMEOUT;
pub use consumer::RelayConsumer;
pub use producer::RelayProducer;
