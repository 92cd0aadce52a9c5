//! SMS Sender Core - Foundation types, error handling, configuration, and logging.
//!
//! This crate provides the shared foundation used by all other sender crates:
//! - Application configuration (database, logging, transport, dispatch)
//! - Error types for storage, lookup, and transport failures
//! - Structured logging with tracing
//! - Platform data/config directories
//! - Common constants

pub mod config;
pub mod error;
pub mod logging;
pub mod platform;
pub mod constants;

// Re-export commonly used items at the crate root
pub use config::AppConfig;
pub use error::{SmsError, SmsResult, TransportError};
pub use logging::init_logging;
pub use platform::Platform;
