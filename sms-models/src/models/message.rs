//! Message entity model.

use serde::{Deserialize, Serialize};
use rusqlite::{params, Connection, Row};
use sms_core::error::{SmsError, SmsResult};

use crate::status::{DeliveryStatus, SendStatus};

/// A text message waiting to be inserted into the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub address: String,
    pub body: String,
}

impl OutgoingMessage {
    pub fn new(address: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            body: body.into(),
        }
    }
}

/// A persisted outgoing message and its send/delivery progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub address: String,
    pub body: String,
    pub send_status: SendStatus,
    pub delivery_status: DeliveryStatus,
    pub error: Option<String>,
    pub date_created: String,
    pub date_updated: String,
}

impl Message {
    /// Construct a Message from a database row.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            address: row.get("address")?,
            body: row.get("body")?,
            send_status: status_column(row, "send_status", SendStatus::parse)?,
            delivery_status: status_column(row, "delivery_status", DeliveryStatus::parse)?,
            error: row.get("error")?,
            date_created: row.get("date_created")?,
            date_updated: row.get("date_updated")?,
        })
    }

    /// Find a message by its id.
    pub fn find_by_id(conn: &Connection, id: i64) -> SmsResult<Option<Self>> {
        match conn.query_row("SELECT * FROM messages WHERE id = ?1", [id], Self::from_row) {
            Ok(msg) => Ok(Some(msg)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(SmsError::Database(e.to_string())),
        }
    }

    /// Insert a new queued message and return it with its assigned id.
    pub fn insert_queued(conn: &Connection, outgoing: &OutgoingMessage) -> SmsResult<Self> {
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO messages (address, body, send_status, delivery_status, date_created, date_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                outgoing.address,
                outgoing.body,
                SendStatus::Queued.as_str(),
                DeliveryStatus::Unknown.as_str(),
                now,
            ],
        )
        .map_err(|e| SmsError::Database(e.to_string()))?;

        Ok(Self {
            id: conn.last_insert_rowid(),
            address: outgoing.address.clone(),
            body: outgoing.body.clone(),
            send_status: SendStatus::Queued,
            delivery_status: DeliveryStatus::Unknown,
            error: None,
            date_created: now.clone(),
            date_updated: now,
        })
    }

    /// One-line summary, e.g. `#3: to=5554, ss=sent, ds=unknown`.
    pub fn debug_line(&self) -> String {
        format!(
            "#{}: to={}, ss={}, ds={}",
            self.id, self.address, self.send_status, self.delivery_status
        )
    }
}

/// Read a status column, reporting unknown values at the column's index.
fn status_column<T>(row: &Row<'_>, column: &str, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let index = row.as_ref().column_index(column)?;
    let value: String = row.get(index)?;
    parse(&value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            format!("invalid {column} value: {value}").into(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_tables(&conn).unwrap();
        conn
    }

    #[test]
    fn test_insert_assigns_increasing_ids() {
        let conn = conn();
        let a = Message::insert_queued(&conn, &OutgoingMessage::new("A", "hi")).unwrap();
        let b = Message::insert_queued(&conn, &OutgoingMessage::new("B", "yo")).unwrap();
        assert!(b.id > a.id);
        assert_eq!(a.send_status, SendStatus::Queued);
        assert_eq!(a.delivery_status, DeliveryStatus::Unknown);

        let found = Message::find_by_id(&conn, b.id).unwrap().unwrap();
        assert_eq!(found, b);
    }

    #[test]
    fn test_find_missing_returns_none() {
        let conn = conn();
        assert!(Message::find_by_id(&conn, 42).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_status_is_database_error() {
        let conn = conn();
        conn.execute(
            "INSERT INTO messages (address, body, send_status, delivery_status, date_created, date_updated)
             VALUES ('A', 'x', 'bogus', 'unknown', '', '')",
            [],
        )
        .unwrap();
        let id = conn.last_insert_rowid();
        assert!(matches!(Message::find_by_id(&conn, id), Err(SmsError::Database(_))));
    }

    #[test]
    fn test_corrupt_status_reports_its_column() {
        let conn = conn();
        conn.execute(
            "INSERT INTO messages (address, body, send_status, delivery_status, date_created, date_updated)
             VALUES ('A', 'x', 'sent', 'lost', '', '')",
            [],
        )
        .unwrap();
        let id = conn.last_insert_rowid();
        let err = conn
            .query_row("SELECT * FROM messages WHERE id = ?1", [id], Message::from_row)
            .unwrap_err();
        match err {
            rusqlite::Error::FromSqlConversionFailure(index, _, cause) => {
                assert_eq!(index, 4);
                assert_eq!(cause.to_string(), "invalid delivery_status value: lost");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_debug_line() {
        let conn = conn();
        let msg = Message::insert_queued(&conn, &OutgoingMessage::new("5554", "Hi!")).unwrap();
        assert_eq!(msg.debug_line(), format!("#{}: to=5554, ss=queued, ds=unknown", msg.id));
    }
}
