//! Shared types for the skiff peer-to-peer message broker.
//!
//! This crate holds the configuration surface consumed when a broker is
//! built, together with its error type. It contains no networking logic.

pub mod config;
pub mod error;

pub use config::{NodeConfig, QueueConfig, TransportConfig};
pub use error::ConfigError;
