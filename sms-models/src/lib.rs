//! SMS Sender Models - Database, message model, status rules, and queries.
//!
//! This crate owns all data persistence: SQLite database initialization,
//! the `Message` entity, versioned migrations, the pure send/delivery
//! status transition rules, and the queries the message store is built on.

pub mod db;
pub mod schema;
pub mod models;
pub mod status;
pub mod queries;
pub mod migrations;

// Re-export key types
pub use db::{Database, DbPool};
pub use models::message::{Message, OutgoingMessage};
pub use status::{DeliveryStatus, SendStatus};
pub use queries::{DeliveryUpdate, MessageCounts, StatusUpdate};
