//! Repository facade: the only entry points triggers and observers use.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use sms_core::config::DispatchConfig;
use sms_core::error::SmsResult;
use sms_models::{DeliveryUpdate, Message, MessageCounts, OutgoingMessage};

use crate::dispatcher::Dispatcher;
use crate::store::MessageStore;
use crate::task::{SendTask, SendTaskHandle};
use crate::transport::{DeliveryReport, Transport};

/// Facade over the message store and the dispatcher.
///
/// Built once at process start; clones share the same store and dispatcher.
#[derive(Clone)]
pub struct SmsSenderRepository {
    store: MessageStore,
    dispatcher: Dispatcher,
}

impl SmsSenderRepository {
    pub fn new(store: MessageStore, dispatcher: Dispatcher) -> Self {
        Self { store, dispatcher }
    }

    /// Wire a store, a dispatcher and the given transport together.
    pub fn with_transport(store: MessageStore, transport: Arc<dyn Transport>, config: DispatchConfig) -> Self {
        let dispatcher = Dispatcher::new(store.clone(), transport, config);
        Self::new(store, dispatcher)
    }

    /// Fail any message a previous process left in `Sending`.
    ///
    /// Call once at start-up, before the first trigger. Nothing is sent.
    pub async fn recover_interrupted(&self) -> SmsResult<usize> {
        self.store.fail_interrupted().await
    }

    /// Queue new messages and trigger a run.
    ///
    /// Once this returns `Ok` the messages are durably queued, even if the
    /// run that follows never finishes.
    pub async fn insert_messages_and_send(&self, messages: Vec<OutgoingMessage>) -> SmsResult<SendTaskHandle> {
        self.store.insert(&messages).await?;
        Ok(self.dispatcher.start_run().await)
    }

    /// Return every failed message to the queue and trigger a run.
    ///
    /// Sent messages are never resent by this.
    pub async fn reset_failed_and_retry(&self) -> SmsResult<SendTaskHandle> {
        let reset = self.store.reset_failed().await?;
        info!("retrying {} failed message(s)", reset.len());
        Ok(self.dispatcher.start_run().await)
    }

    /// Live full-table snapshots, ordered by id.
    pub fn all_messages(&self) -> watch::Receiver<Vec<Message>> {
        self.store.observe_all()
    }

    /// Live view of the most recently published send task.
    pub fn latest_send_task(&self) -> watch::Receiver<SendTask> {
        self.dispatcher.latest()
    }

    /// Apply a delivery report from the platform.
    ///
    /// Reports are keyed by message id and apply whichever run sent the
    /// message. Reports for messages that are not `Sent`, and every report
    /// after the first, are ignored.
    pub async fn on_delivery_report(&self, id: i64, delivered: bool) -> SmsResult<DeliveryUpdate> {
        self.store.apply_delivery_report(id, delivered).await
    }

    /// Per-status totals.
    pub async fn counts(&self) -> SmsResult<MessageCounts> {
        self.store.counts().await
    }

    /// Wait until the dispatcher has no active run.
    pub async fn wait_idle(&self) {
        self.dispatcher.wait_idle().await
    }

    /// Feed transport delivery callbacks into the store until the channel closes.
    pub fn spawn_delivery_listener(&self, mut reports: mpsc::Receiver<DeliveryReport>) -> JoinHandle<()> {
        let repo = self.clone();
        tokio::spawn(async move {
            while let Some(report) = reports.recv().await {
                if let Err(e) = repo.on_delivery_report(report.message_id, report.delivered).await {
                    warn!("delivery report for message {} not applied: {e}", report.message_id);
                }
            }
        })
    }
}
