//! Application-wide constants.

/// Application name.
pub const APP_NAME: &str = "SmsSender";

/// Application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default timeout for a single transport send in milliseconds.
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 30_000;

/// Default buffer size of the delivery report channel.
pub const DEFAULT_DELIVERY_CHANNEL_CAPACITY: usize = 64;

/// Database schema version.
pub const DB_SCHEMA_VERSION: i32 = 1;

/// Error recorded on messages found mid-send after a restart.
pub const INTERRUPTED_SEND_ERROR: &str = "send interrupted";
