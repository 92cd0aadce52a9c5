//! Shared test utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sms_core::config::{DatabaseConfig, DispatchConfig};
use sms_core::TransportError;
use sms_models::{Database, Message, OutgoingMessage};
use sms_services::{MessageStore, SmsSenderRepository, Transport};
use tempfile::TempDir;

/// Create a temporary database with full schema and migrations applied.
/// Returns the Database and the TempDir (must be held alive for the duration of the test).
pub fn create_test_db() -> (Database, TempDir) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let path = dir.path().join("test.db");
    let config = DatabaseConfig::default();
    let db = Database::init(&path, &config).expect("failed to init test database");
    (db, dir)
}

/// Repository over a fresh database and the given transport.
pub fn create_test_repository(transport: Arc<ScriptedTransport>) -> (SmsSenderRepository, TempDir) {
    create_test_repository_with(transport, DispatchConfig::default())
}

pub fn create_test_repository_with(
    transport: Arc<ScriptedTransport>,
    config: DispatchConfig,
) -> (SmsSenderRepository, TempDir) {
    let (db, dir) = create_test_db();
    let store = MessageStore::new(db).expect("failed to open store");
    (SmsSenderRepository::with_transport(store, transport, config), dir)
}

pub fn outgoing(pairs: &[(&str, &str)]) -> Vec<OutgoingMessage> {
    pairs.iter().map(|(a, b)| OutgoingMessage::new(*a, *b)).collect()
}

/// Find a message by address in a table snapshot.
pub fn by_address<'a>(table: &'a [Message], address: &str) -> &'a Message {
    table
        .iter()
        .find(|m| m.address == address)
        .unwrap_or_else(|| panic!("no message to {address}"))
}

/// Transport whose outcome per address is set by the test.
///
/// Records every call and the highest number of overlapping sends.
#[derive(Default)]
pub struct ScriptedTransport {
    failing: Mutex<HashSet<String>>,
    unavailable: Mutex<HashSet<String>>,
    delay: Mutex<Duration>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sends to `address` fail with a per-message error.
    pub fn fail_for(&self, address: &str) {
        self.failing.lock().unwrap().insert(address.to_string());
    }

    /// Sends to `address` report the transport as unusable.
    pub fn unavailable_for(&self, address: &str) {
        self.unavailable.lock().unwrap().insert(address.to_string());
    }

    pub fn succeed_all(&self) {
        self.failing.lock().unwrap().clear();
        self.unavailable.lock().unwrap().clear();
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Addresses passed to `send`, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, _message_id: i64, address: &str, _body: &str) -> Result<(), TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(address.to_string());

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.unavailable.lock().unwrap().contains(address) {
            return Err(TransportError::Unavailable("radio off".into()));
        }
        if self.failing.lock().unwrap().contains(address) {
            return Err(TransportError::Failed(format!("no service for {address}")));
        }
        Ok(())
    }
}

/// Transport that succeeds, but on its `break_on`-th call moves the
/// `messages` table out of the way so recording that outcome fails.
pub struct StoreBreakingTransport {
    db: Database,
    break_on: usize,
    calls: AtomicUsize,
}

impl StoreBreakingTransport {
    pub fn new(db: Database, break_on: usize) -> Arc<Self> {
        Arc::new(Self {
            db,
            break_on,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Put the `messages` table back.
    pub fn restore(&self) {
        let conn = self.db.conn().expect("failed to get connection");
        conn.execute("ALTER TABLE messages_moved RENAME TO messages", [])
            .expect("failed to restore messages table");
    }
}

#[async_trait]
impl Transport for StoreBreakingTransport {
    async fn send(&self, _message_id: i64, _address: &str, _body: &str) -> Result<(), TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.break_on {
            let conn = self.db.conn().expect("failed to get connection");
            conn.execute("ALTER TABLE messages RENAME TO messages_moved", [])
                .expect("failed to move messages table");
        }
        Ok(())
    }
}
