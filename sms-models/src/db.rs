//! Database initialization, connection pooling, and lifecycle management.
//!
//! Uses SQLite in WAL mode with r2d2 connection pooling.
//! Runs integrity checks on startup and applies versioned migrations.

use std::path::Path;
use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::{info, error};

use sms_core::error::{SmsError, SmsResult};
use sms_core::config::DatabaseConfig;

use crate::schema;
use crate::migrations;

/// Type alias for the SQLite connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Database wrapper providing initialization, pooling, and lifecycle management.
#[derive(Clone)]
pub struct Database {
    pool: Arc<DbPool>,
}

impl Database {
    /// Initialize the database at the given path with the provided configuration.
    ///
    /// This:
    /// 1. Creates the database file and parent directories if needed
    /// 2. Sets up connection pooling (WAL mode, busy timeout)
    /// 3. Runs integrity checks if configured
    /// 4. Creates the schema tables
    /// 5. Runs pending migrations
    pub fn init(db_path: &Path, config: &DatabaseConfig) -> SmsResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("initializing database at {}", db_path.display());

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(config.pool_size.max(1))
            .connection_customizer(Box::new(ConnectionCustomizer {
                wal_mode: config.wal_mode,
            }))
            .build(manager)
            .map_err(|e| SmsError::Pool(e.to_string()))?;

        let db = Self {
            pool: Arc::new(pool),
        };

        if config.integrity_check_on_startup {
            db.run_integrity_check()?;
        }

        {
            let conn = db.conn()?;
            schema::create_tables(&conn)?;
            migrations::run_migrations(&conn)?;
        }

        info!("database initialized successfully");
        Ok(db)
    }

    /// Get a connection from the pool.
    pub fn conn(&self) -> SmsResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| SmsError::Pool(e.to_string()))
    }

    /// Run a SQLite integrity check.
    pub fn run_integrity_check(&self) -> SmsResult<()> {
        let conn = self.conn()?;
        let result: String = conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))
            .map_err(|e| SmsError::Database(e.to_string()))?;

        if result != "ok" {
            error!("database integrity check failed: {result}");
            return Err(SmsError::IntegrityCheck(result));
        }

        info!("database integrity check passed");
        Ok(())
    }

    /// Execute a function within a database transaction.
    pub fn transaction<T, F>(&self, f: F) -> SmsResult<T>
    where
        F: FnOnce(&Connection) -> SmsResult<T>,
    {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| SmsError::Database(e.to_string()))?;

        let result = f(&tx)?;

        tx.commit()
            .map_err(|e| SmsError::Database(e.to_string()))?;

        Ok(result)
    }
}

/// r2d2 connection customizer that applies PRAGMA settings.
#[derive(Debug)]
struct ConnectionCustomizer {
    wal_mode: bool,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        if self.wal_mode {
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        }

        conn.execute_batch(
            "PRAGMA synchronous=NORMAL;
             PRAGMA temp_store=MEMORY;
             PRAGMA busy_timeout=5000;",
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::{Message, OutgoingMessage};
    use tempfile::TempDir;

    fn test_db() -> (Database, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let config = DatabaseConfig::default();
        let db = Database::init(&path, &config).unwrap();
        (db, dir)
    }

    #[test]
    fn test_integrity_check() {
        let (db, _dir) = test_db();
        assert!(db.run_integrity_check().is_ok());
    }

    #[test]
    fn test_transaction_commits() {
        let (db, _dir) = test_db();
        let id = db
            .transaction(|conn| {
                let msg = Message::insert_queued(conn, &OutgoingMessage::new("A", "hi"))?;
                Ok(msg.id)
            })
            .unwrap();
        let conn = db.conn().unwrap();
        assert!(Message::find_by_id(&conn, id).unwrap().is_some());
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let (db, _dir) = test_db();
        let result: SmsResult<()> = db.transaction(|conn| {
            Message::insert_queued(conn, &OutgoingMessage::new("A", "hi"))?;
            Err(SmsError::Database("abort".into()))
        });
        assert!(result.is_err());

        let conn = db.conn().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("persist.db");
        let config = DatabaseConfig::default();
        let id = {
            let db = Database::init(&path, &config).unwrap();
            let conn = db.conn().unwrap();
            Message::insert_queued(&conn, &OutgoingMessage::new("A", "hi")).unwrap().id
        };

        let db = Database::init(&path, &config).unwrap();
        let conn = db.conn().unwrap();
        assert!(Message::find_by_id(&conn, id).unwrap().is_some());
    }
}
