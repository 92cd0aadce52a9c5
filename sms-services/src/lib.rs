//! SMS Sender Services - Message store, dispatcher, and repository facade.
//!
//! This crate provides the runtime side of the sender:
//! - `MessageStore`: durable table with a live full-table view
//! - `Dispatcher`: one send pass at a time over the queued messages
//! - `SmsSenderRepository`: the facade triggers and observers use
//! - `Transport` port with timeout and simulated adapters
//! - `SendCommand` parsing for the command channel

pub mod command;
pub mod dispatcher;
pub mod repository;
pub mod store;
pub mod task;
pub mod transport;

// Re-export key types
pub use command::SendCommand;
pub use dispatcher::Dispatcher;
pub use repository::SmsSenderRepository;
pub use store::MessageStore;
pub use task::{SendTask, SendTaskHandle, TaskId, TaskState};
pub use transport::{DeliveryReport, SimulatedTransport, TimeoutTransport, Transport};
