//! RocketLink Core - Foundation types, error handling, configuration, and logging.
//!
//! This crate provides the shared foundation used by all other RocketLink crates:
//! - Application configuration (server address, session tuning, logging)
//! - Global error types covering the transport, protocol and REST layers
//! - Structured logging with tracing
//! - Platform directory lookup
//! - Common constants

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod platform;

// Re-export commonly used items at the crate root
pub use config::{AppConfig, ConfigHandle};
pub use error::{RlError, RlResult};
pub use logging::init_logging;
pub use platform::Platform;
