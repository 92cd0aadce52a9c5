//! Queries over the `messages` table.
//!
//! Every write here is a single SQL statement, so a reader never observes
//! a half-applied update. Status changes are guarded in SQL: the update
//! statement itself forces `delivery_status = 'unknown'` whenever the
//! resulting `send_status` is not `sent`.

use rusqlite::{params, Connection};
use serde::Serialize;
use sms_core::error::{SmsError, SmsResult};

use crate::models::message::Message;
use crate::status::{self, DeliveryStatus, SendOutcome, SendStatus};

/// Partial status update for one message. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    pub send_status: Option<SendStatus>,
    pub delivery_status: Option<DeliveryStatus>,
    /// `Some(None)` clears the error, `None` keeps it.
    pub error: Option<Option<String>>,
}

impl StatusUpdate {
    /// Move to a new send status and clear any previous error.
    pub fn send_status(status: SendStatus) -> Self {
        Self {
            send_status: Some(status),
            delivery_status: None,
            error: Some(None),
        }
    }
}

impl From<SendOutcome> for StatusUpdate {
    fn from(outcome: SendOutcome) -> Self {
        Self {
            send_status: Some(outcome.send_status),
            delivery_status: Some(outcome.delivery_status),
            error: Some(outcome.error),
        }
    }
}

/// Result of applying a delivery report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryUpdate {
    /// The message moved to this delivery status.
    Applied(DeliveryStatus),
    /// The report was early, duplicate, or contradicted an earlier report.
    Ignored,
}

/// Per-status message totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageCounts {
    pub queued: i64,
    pub sending: i64,
    pub sent: i64,
    pub failed: i64,
    pub delivered: i64,
    pub delivery_failed: i64,
}

impl std::fmt::Display for MessageCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "queued={}, sending={}, sent={}, failed={}, delivered={}, delivery_failed={}",
            self.queued, self.sending, self.sent, self.failed, self.delivered, self.delivery_failed
        )
    }
}

fn collect_messages(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> SmsResult<Vec<Message>> {
    let mut stmt = conn.prepare(sql).map_err(|e| SmsError::Database(e.to_string()))?;
    let messages = stmt
        .query_map(args, Message::from_row)
        .map_err(|e| SmsError::Database(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SmsError::Database(e.to_string()))?;
    Ok(messages)
}

/// All messages in insertion order.
pub fn list_messages(conn: &Connection) -> SmsResult<Vec<Message>> {
    collect_messages(conn, "SELECT * FROM messages ORDER BY id ASC", &[])
}

/// Messages with the given send status, ascending by id.
pub fn list_messages_by_send_status(conn: &Connection, send_status: SendStatus) -> SmsResult<Vec<Message>> {
    collect_messages(
        conn,
        "SELECT * FROM messages WHERE send_status = ?1 ORDER BY id ASC",
        &[&send_status.as_str()],
    )
}

/// Whether any message is waiting to be sent.
pub fn has_queued(conn: &Connection) -> SmsResult<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM messages WHERE send_status = 'queued')",
        [],
        |row| row.get(0),
    )
    .map_err(|e| SmsError::Database(e.to_string()))
}

fn message_exists(conn: &Connection, id: i64) -> SmsResult<bool> {
    conn.query_row("SELECT EXISTS(SELECT 1 FROM messages WHERE id = ?1)", [id], |row| row.get(0))
        .map_err(|e| SmsError::Database(e.to_string()))
}

/// Apply a partial status update to one message.
pub fn update_message_status(conn: &Connection, id: i64, update: &StatusUpdate) -> SmsResult<()> {
    let now = chrono::Utc::now().to_rfc3339();
    let (set_error, error) = match &update.error {
        Some(error) => (true, error.clone()),
        None => (false, None),
    };
    let changed = conn
        .execute(
            "UPDATE messages SET
                 send_status = COALESCE(?2, send_status),
                 delivery_status = CASE
                     WHEN COALESCE(?2, send_status) = 'sent' THEN COALESCE(?3, delivery_status)
                     ELSE 'unknown'
                 END,
                 error = CASE WHEN ?4 THEN ?5 ELSE error END,
                 date_updated = ?6
             WHERE id = ?1",
            params![
                id,
                update.send_status.map(|s| s.as_str()),
                update.delivery_status.map(|s| s.as_str()),
                set_error,
                error,
                now,
            ],
        )
        .map_err(|e| SmsError::Database(e.to_string()))?;

    if changed == 0 {
        return Err(SmsError::MessageNotFound(id));
    }
    Ok(())
}

/// Atomically move a message from `queued` to `sending`.
///
/// Returns false when the message exists but is no longer queued.
pub fn claim_for_sending(conn: &Connection, id: i64) -> SmsResult<bool> {
    let now = chrono::Utc::now().to_rfc3339();
    let changed = conn
        .execute(
            "UPDATE messages SET send_status = 'sending', error = NULL, date_updated = ?2
             WHERE id = ?1 AND send_status = 'queued'",
            params![id, now],
        )
        .map_err(|e| SmsError::Database(e.to_string()))?;

    if changed == 1 {
        return Ok(true);
    }
    if message_exists(conn, id)? {
        Ok(false)
    } else {
        Err(SmsError::MessageNotFound(id))
    }
}

/// Move a failed message back to the queue, clearing its error and
/// delivery status.
///
/// Returns false when the message exists but is no longer failed.
pub fn requeue_failed(conn: &Connection, id: i64) -> SmsResult<bool> {
    let now = chrono::Utc::now().to_rfc3339();
    let changed = conn
        .execute(
            "UPDATE messages SET send_status = ?2, delivery_status = 'unknown',
                 error = NULL, date_updated = ?3
             WHERE id = ?1 AND send_status = ?4",
            params![
                id,
                SendStatus::Failed.on_reset().as_str(),
                now,
                SendStatus::Failed.as_str(),
            ],
        )
        .map_err(|e| SmsError::Database(e.to_string()))?;

    if changed == 1 {
        return Ok(true);
    }
    if message_exists(conn, id)? {
        Ok(false)
    } else {
        Err(SmsError::MessageNotFound(id))
    }
}

/// Apply a platform delivery report to a sent message.
///
/// Only the first report for a sent message takes effect.
pub fn apply_delivery_report(conn: &Connection, id: i64, delivered: bool) -> SmsResult<DeliveryUpdate> {
    let current = Message::find_by_id(conn, id)?.ok_or(SmsError::MessageNotFound(id))?;
    let Some(next) = status::on_delivery_report(current.send_status, delivered) else {
        return Ok(DeliveryUpdate::Ignored);
    };

    let now = chrono::Utc::now().to_rfc3339();
    let changed = conn
        .execute(
            "UPDATE messages SET delivery_status = ?2, date_updated = ?3
             WHERE id = ?1 AND send_status = 'sent' AND delivery_status = 'unknown'",
            params![id, next.as_str(), now],
        )
        .map_err(|e| SmsError::Database(e.to_string()))?;

    Ok(if changed == 1 {
        DeliveryUpdate::Applied(next)
    } else {
        DeliveryUpdate::Ignored
    })
}

/// Mark every message left in `sending` as failed with the given error.
pub fn fail_interrupted_sends(conn: &Connection, error: &str) -> SmsResult<usize> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE messages SET send_status = 'failed', delivery_status = 'unknown', error = ?1, date_updated = ?2
         WHERE send_status = 'sending'",
        params![error, now],
    )
    .map_err(|e| SmsError::Database(e.to_string()))
}

/// Count messages per send and delivery status.
pub fn count_by_status(conn: &Connection) -> SmsResult<MessageCounts> {
    let mut stmt = conn
        .prepare("SELECT send_status, delivery_status, COUNT(*) FROM messages GROUP BY send_status, delivery_status")
        .map_err(|e| SmsError::Database(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
        })
        .map_err(|e| SmsError::Database(e.to_string()))?;

    let mut counts = MessageCounts::default();
    for row in rows {
        let (send, delivery, n) = row.map_err(|e| SmsError::Database(e.to_string()))?;
        match SendStatus::parse(&send) {
            Some(SendStatus::Queued) => counts.queued += n,
            Some(SendStatus::Sending) => counts.sending += n,
            Some(SendStatus::Sent) => counts.sent += n,
            Some(SendStatus::Failed) => counts.failed += n,
            None => return Err(SmsError::Database(format!("invalid send_status value: {send}"))),
        }
        match DeliveryStatus::parse(&delivery) {
            Some(DeliveryStatus::Delivered) => counts.delivered += n,
            Some(DeliveryStatus::Failed) => counts.delivery_failed += n,
            Some(DeliveryStatus::Unknown) => {}
            None => return Err(SmsError::Database(format!("invalid delivery_status value: {delivery}"))),
        }
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::OutgoingMessage;
    use crate::schema;

    fn conn_with(addresses: &[&str]) -> (Connection, Vec<i64>) {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_tables(&conn).unwrap();
        let ids = addresses
            .iter()
            .map(|a| Message::insert_queued(&conn, &OutgoingMessage::new(*a, "body")).unwrap().id)
            .collect();
        (conn, ids)
    }

    fn get(conn: &Connection, id: i64) -> Message {
        Message::find_by_id(conn, id).unwrap().unwrap()
    }

    #[test]
    fn test_list_by_status_is_ordered() {
        let (conn, ids) = conn_with(&["A", "B", "C"]);
        update_message_status(&conn, ids[1], &StatusUpdate::send_status(SendStatus::Sent)).unwrap();

        let queued = list_messages_by_send_status(&conn, SendStatus::Queued).unwrap();
        let queued_ids: Vec<i64> = queued.iter().map(|m| m.id).collect();
        assert_eq!(queued_ids, vec![ids[0], ids[2]]);
        assert_eq!(list_messages(&conn).unwrap().len(), 3);
        assert!(has_queued(&conn).unwrap());
    }

    #[test]
    fn test_update_unknown_id_is_not_found() {
        let (conn, _) = conn_with(&[]);
        let err = update_message_status(&conn, 99, &StatusUpdate::send_status(SendStatus::Sent)).unwrap_err();
        assert!(matches!(err, SmsError::MessageNotFound(99)));
    }

    #[test]
    fn test_update_keeps_delivery_unknown_unless_sent() {
        let (conn, ids) = conn_with(&["A"]);
        let update = StatusUpdate {
            send_status: Some(SendStatus::Failed),
            delivery_status: Some(DeliveryStatus::Delivered),
            error: Some(Some("boom".into())),
        };
        update_message_status(&conn, ids[0], &update).unwrap();

        let msg = get(&conn, ids[0]);
        assert_eq!(msg.send_status, SendStatus::Failed);
        assert_eq!(msg.delivery_status, DeliveryStatus::Unknown);
        assert_eq!(msg.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_partial_update_keeps_error() {
        let (conn, ids) = conn_with(&["A"]);
        update_message_status(&conn, ids[0], &status::on_send_result(Err("boom".into())).into()).unwrap();
        let update = StatusUpdate {
            delivery_status: Some(DeliveryStatus::Unknown),
            ..Default::default()
        };
        update_message_status(&conn, ids[0], &update).unwrap();
        assert_eq!(get(&conn, ids[0]).error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_claim_only_once() {
        let (conn, ids) = conn_with(&["A"]);
        assert!(claim_for_sending(&conn, ids[0]).unwrap());
        assert!(!claim_for_sending(&conn, ids[0]).unwrap());
        assert_eq!(get(&conn, ids[0]).send_status, SendStatus::Sending);
        assert!(matches!(claim_for_sending(&conn, 1234), Err(SmsError::MessageNotFound(1234))));
    }

    #[test]
    fn test_delivery_report_before_and_after_sent() {
        let (conn, ids) = conn_with(&["B"]);
        assert_eq!(apply_delivery_report(&conn, ids[0], true).unwrap(), DeliveryUpdate::Ignored);

        claim_for_sending(&conn, ids[0]).unwrap();
        assert_eq!(apply_delivery_report(&conn, ids[0], true).unwrap(), DeliveryUpdate::Ignored);

        update_message_status(&conn, ids[0], &status::on_send_result(Ok(())).into()).unwrap();
        assert_eq!(
            apply_delivery_report(&conn, ids[0], true).unwrap(),
            DeliveryUpdate::Applied(DeliveryStatus::Delivered)
        );
        assert_eq!(apply_delivery_report(&conn, ids[0], true).unwrap(), DeliveryUpdate::Ignored);
        assert_eq!(apply_delivery_report(&conn, ids[0], false).unwrap(), DeliveryUpdate::Ignored);
        assert_eq!(get(&conn, ids[0]).delivery_status, DeliveryStatus::Delivered);

        assert!(matches!(apply_delivery_report(&conn, 77, true), Err(SmsError::MessageNotFound(77))));
    }

    #[test]
    fn test_requeue_failed_only_moves_failed() {
        let (conn, ids) = conn_with(&["A", "B"]);
        let failed = StatusUpdate {
            send_status: Some(SendStatus::Failed),
            delivery_status: None,
            error: Some(Some("no service".into())),
        };
        update_message_status(&conn, ids[0], &failed).unwrap();
        update_message_status(&conn, ids[1], &StatusUpdate::send_status(SendStatus::Sent)).unwrap();

        assert!(requeue_failed(&conn, ids[0]).unwrap());
        let requeued = get(&conn, ids[0]);
        assert_eq!(requeued.send_status, SendStatus::Queued);
        assert_eq!(requeued.error, None);

        // Already requeued, or sent in the meantime: left alone.
        assert!(!requeue_failed(&conn, ids[0]).unwrap());
        assert!(!requeue_failed(&conn, ids[1]).unwrap());
        assert_eq!(get(&conn, ids[1]).send_status, SendStatus::Sent);
        assert!(matches!(requeue_failed(&conn, 99), Err(SmsError::MessageNotFound(99))));
    }

    #[test]
    fn test_fail_interrupted_sends() {
        let (conn, ids) = conn_with(&["A", "B"]);
        claim_for_sending(&conn, ids[0]).unwrap();
        assert_eq!(fail_interrupted_sends(&conn, "send interrupted").unwrap(), 1);

        let msg = get(&conn, ids[0]);
        assert_eq!(msg.send_status, SendStatus::Failed);
        assert_eq!(msg.error.as_deref(), Some("send interrupted"));
        assert_eq!(get(&conn, ids[1]).send_status, SendStatus::Queued);
    }

    #[test]
    fn test_counts() {
        let (conn, ids) = conn_with(&["A", "B", "C"]);
        update_message_status(&conn, ids[0], &status::on_send_result(Ok(())).into()).unwrap();
        update_message_status(&conn, ids[1], &status::on_send_result(Err("x".into())).into()).unwrap();
        apply_delivery_report(&conn, ids[0], true).unwrap();

        let counts = count_by_status(&conn).unwrap();
        assert_eq!(counts.queued, 1);
        assert_eq!(counts.sent, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.delivered, 1);
        assert!(counts.to_string().contains("queued=1"));
    }
}
