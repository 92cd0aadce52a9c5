//! Durable message store with a live view of the whole table.
//!
//! Wraps the SQLite `Database` and republishes the full ordered table to a
//! `watch` channel after every write, so each subscriber immediately sees
//! the current table and then every later snapshot.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use sms_core::constants::INTERRUPTED_SEND_ERROR;
use sms_core::error::{SmsError, SmsResult};
use sms_models::queries::{self, DeliveryUpdate, MessageCounts, StatusUpdate};
use sms_models::{Database, Message, OutgoingMessage, SendStatus};

/// Store for outgoing messages.
///
/// Cheap to clone; all clones share the database pool and the live view.
#[derive(Clone)]
pub struct MessageStore {
    database: Database,
    snapshot_tx: Arc<watch::Sender<Vec<Message>>>,
    /// Serializes re-reading and publishing so an older snapshot can never
    /// replace a newer one.
    publish_lock: Arc<Mutex<()>>,
}

impl MessageStore {
    /// Open the store over an initialized database and load the first snapshot.
    pub fn new(database: Database) -> SmsResult<Self> {
        let initial = {
            let conn = database.conn()?;
            queries::list_messages(&conn)?
        };
        let (snapshot_tx, _) = watch::channel(initial);
        Ok(Self {
            database,
            snapshot_tx: Arc::new(snapshot_tx),
            publish_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Insert queued messages, assigning ids in submission order.
    pub async fn insert(&self, messages: &[OutgoingMessage]) -> SmsResult<Vec<Message>> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        let inserted = self.database.transaction(|conn| {
            messages
                .iter()
                .map(|m| Message::insert_queued(conn, m))
                .collect::<SmsResult<Vec<_>>>()
        })?;
        info!("queued {} message(s)", inserted.len());
        self.publish().await;
        Ok(inserted)
    }

    /// Apply a partial status update to one message.
    pub async fn update_status(&self, id: i64, update: StatusUpdate) -> SmsResult<()> {
        {
            let conn = self.database.conn()?;
            queries::update_message_status(&conn, id, &update)
                .inspect_err(|e| log_not_found(e, "status update"))?;
        }
        debug!("message {id} updated: {update:?}");
        self.publish().await;
        Ok(())
    }

    /// Move a queued message to `Sending`. False if it is no longer queued.
    pub async fn claim(&self, id: i64) -> SmsResult<bool> {
        let claimed = {
            let conn = self.database.conn()?;
            queries::claim_for_sending(&conn, id)?
        };
        if claimed {
            self.publish().await;
        }
        Ok(claimed)
    }

    /// Snapshot of queued messages, oldest first.
    pub async fn query_queued(&self) -> SmsResult<Vec<Message>> {
        self.query_by_status(SendStatus::Queued).await
    }

    /// Snapshot of messages with the given send status, oldest first.
    pub async fn query_by_status(&self, status: SendStatus) -> SmsResult<Vec<Message>> {
        let conn = self.database.conn()?;
        queries::list_messages_by_send_status(&conn, status)
    }

    /// Whether any message is waiting to be sent.
    pub async fn has_queued(&self) -> SmsResult<bool> {
        let conn = self.database.conn()?;
        queries::has_queued(&conn)
    }

    /// Find one message.
    pub async fn find(&self, id: i64) -> SmsResult<Option<Message>> {
        let conn = self.database.conn()?;
        Message::find_by_id(&conn, id)
    }

    /// Per-status totals.
    pub async fn counts(&self) -> SmsResult<MessageCounts> {
        let conn = self.database.conn()?;
        queries::count_by_status(&conn)
    }

    /// Return every failed message to the queue, clearing its error.
    ///
    /// Returns the ids that moved. Each move is conditional on the message
    /// still being failed, so concurrent resets never requeue a message a
    /// run has claimed or sent in the meantime.
    pub async fn reset_failed(&self) -> SmsResult<Vec<i64>> {
        let mut reset = Vec::new();
        {
            let conn = self.database.conn()?;
            for message in queries::list_messages_by_send_status(&conn, SendStatus::Failed)? {
                if queries::requeue_failed(&conn, message.id)? {
                    reset.push(message.id);
                }
            }
        }
        if !reset.is_empty() {
            info!("reset {} failed message(s) to queued", reset.len());
            self.publish().await;
        }
        Ok(reset)
    }

    /// Apply a platform delivery report.
    pub async fn apply_delivery_report(&self, id: i64, delivered: bool) -> SmsResult<DeliveryUpdate> {
        let result = {
            let conn = self.database.conn()?;
            queries::apply_delivery_report(&conn, id, delivered)
                .inspect_err(|e| log_not_found(e, "delivery report"))?
        };
        match result {
            DeliveryUpdate::Applied(status) => {
                debug!("message {id} delivery status -> {status}");
                self.publish().await;
            }
            DeliveryUpdate::Ignored => {
                debug!("ignored delivery report for message {id} (delivered={delivered})");
            }
        }
        Ok(result)
    }

    /// Fail messages left in `Sending` by a previous process.
    pub async fn fail_interrupted(&self) -> SmsResult<usize> {
        let count = {
            let conn = self.database.conn()?;
            queries::fail_interrupted_sends(&conn, INTERRUPTED_SEND_ERROR)?
        };
        if count > 0 {
            warn!("{count} message(s) were interrupted mid-send and marked failed");
            self.publish().await;
        }
        Ok(count)
    }

    /// Live view of the full table, ordered by id.
    ///
    /// The receiver starts with the current table and sees every later
    /// snapshot (intermediate ones may be skipped by slow readers).
    pub fn observe_all(&self) -> watch::Receiver<Vec<Message>> {
        self.snapshot_tx.subscribe()
    }

    /// Re-read the table and push it to all observers.
    ///
    /// A failed re-read leaves the previous snapshot in place; the write
    /// that triggered it has already been committed.
    async fn publish(&self) {
        let _guard = self.publish_lock.lock().await;
        let snapshot = match self.database.conn().and_then(|conn| queries::list_messages(&conn)) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("failed to refresh message snapshot: {e}");
                return;
            }
        };
        self.snapshot_tx.send_replace(snapshot);
    }
}

fn log_not_found(err: &SmsError, operation: &str) {
    if let SmsError::MessageNotFound(id) = err {
        error!("{operation} for unknown message {id}");
    }
}
