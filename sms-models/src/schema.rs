//! Database schema definitions and table creation.
//!
//! A single append-favoring `messages` table keyed by an AUTOINCREMENT id,
//! so ids are never reused and define send order.

use rusqlite::Connection;
use sms_core::error::{SmsError, SmsResult};
use tracing::info;

/// Create all database tables if they do not exist.
pub fn create_tables(conn: &Connection) -> SmsResult<()> {
    conn.execute_batch(SCHEMA_SQL)
        .map_err(|e| SmsError::Database(format!("failed to create schema: {e}")))?;
    info!("database schema verified");
    Ok(())
}

/// Complete SQL schema for all tables.
const SCHEMA_SQL: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

-- Outgoing messages
CREATE TABLE IF NOT EXISTS messages (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    address             TEXT NOT NULL,
    body                TEXT NOT NULL,
    send_status         TEXT NOT NULL DEFAULT 'queued',
    delivery_status     TEXT NOT NULL DEFAULT 'unknown',
    error               TEXT,
    date_created        TEXT NOT NULL,
    date_updated        TEXT NOT NULL
);
"#;
