//! Global error types for the SMS sender.
//!
//! Operation-level failures are unified into a single `SmsError` enum with
//! conversions from underlying library errors. Per-message transport
//! failures have their own `TransportError` type because they are recorded
//! on the message instead of being propagated to the caller.

use std::time::Duration;

use thiserror::Error;

/// Convenience type alias for Results using SmsError.
pub type SmsResult<T> = Result<T, SmsError>;

/// Unified error type for store, configuration, and command failures.
#[derive(Error, Debug)]
pub enum SmsError {
    // -- Configuration errors --
    /// Failed to load or parse application configuration.
    #[error("configuration error: {0}")]
    Config(String),

    // -- Database errors --
    /// SQLite database error (store unavailable or corrupt).
    #[error("database error: {0}")]
    Database(String),

    /// Database migration failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// Database connection pool error.
    #[error("connection pool error: {0}")]
    Pool(String),

    /// Database integrity check failed.
    #[error("database integrity check failed: {0}")]
    IntegrityCheck(String),

    // -- Message errors --
    /// A message id was referenced that does not exist.
    #[error("message not found: {0}")]
    MessageNotFound(i64),

    /// A send command from the command channel could not be accepted.
    #[error("invalid send command: {0}")]
    InvalidCommand(String),

    // -- File/IO errors --
    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl SmsError {
    /// Whether this error comes from the storage layer.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Pool(_) | Self::Migration(_) | Self::IntegrityCheck(_)
        )
    }
}

impl From<serde_json::Error> for SmsError {
    fn from(e: serde_json::Error) -> Self {
        SmsError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for SmsError {
    fn from(e: toml::de::Error) -> Self {
        SmsError::Config(e.to_string())
    }
}

/// Failure reported by the transport for a single send attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport rejected or failed this particular message.
    #[error("send failed: {0}")]
    Failed(String),

    /// The send did not complete within the imposed timeout.
    #[error("send timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The transport itself is unusable; no further sends should be attempted.
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    /// Whether the fault is not message-specific and the current run must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sms_error_display() {
        let err = SmsError::Config("bad value".to_string());
        assert_eq!(err.to_string(), "configuration error: bad value");
        assert_eq!(SmsError::MessageNotFound(7).to_string(), "message not found: 7");
    }

    #[test]
    fn test_storage_classification() {
        assert!(SmsError::Database("locked".into()).is_storage());
        assert!(SmsError::Pool("timeout".into()).is_storage());
        assert!(!SmsError::MessageNotFound(1).is_storage());
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "send timed out after 1500ms");
        assert!(!err.is_fatal());
        assert!(TransportError::Unavailable("radio off".into()).is_fatal());
        assert!(!TransportError::Failed("no service".into()).is_fatal());
    }
}
