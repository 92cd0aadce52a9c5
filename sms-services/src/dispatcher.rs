//! Dispatcher: at most one send pass at a time over the queued messages.
//!
//! A run snapshots the queue once, hands each message to the transport in
//! ascending id order and records every outcome before moving on. Triggers
//! that arrive while a run is active coalesce into it; if any of them came
//! in, the same worker starts one follow-up run for messages queued after
//! the snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

use sms_core::config::DispatchConfig;
use sms_core::TransportError;
use sms_models::status;
use sms_models::SendStatus;

use crate::store::MessageStore;
use crate::task::{SendTask, SendTaskHandle, TaskId};
use crate::transport::Transport;

/// Runs send passes over the queue, one at a time.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    store: MessageStore,
    transport: Arc<dyn Transport>,
    config: DispatchConfig,
    next_task_id: AtomicU64,
    /// Run-exclusivity flag. Never held across a transport call.
    active: Mutex<ActiveRun>,
    latest_tx: watch::Sender<SendTask>,
    busy_tx: watch::Sender<bool>,
}

#[derive(Default)]
struct ActiveRun {
    handle: Option<SendTaskHandle>,
    /// Sender of the active run, kept so a crashed worker's task can still
    /// be finished for its waiters.
    tx: Option<Arc<watch::Sender<SendTask>>>,
    rerun_requested: bool,
}

/// One run's mutable task plus its private channel.
struct Run {
    task: SendTask,
    tx: Arc<watch::Sender<SendTask>>,
}

impl Run {
    fn publish(&self, latest: &watch::Sender<SendTask>) {
        self.tx.send_replace(self.task.clone());
        latest.send_replace(self.task.clone());
    }
}

impl Dispatcher {
    pub fn new(store: MessageStore, transport: Arc<dyn Transport>, config: DispatchConfig) -> Self {
        let (latest_tx, _) = watch::channel(SendTask::idle());
        let (busy_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                store,
                transport,
                config,
                next_task_id: AtomicU64::new(1),
                active: Mutex::new(ActiveRun::default()),
                latest_tx,
                busy_tx,
            }),
        }
    }

    /// Start a run over the currently queued messages.
    ///
    /// If a run is already active this returns its handle instead and
    /// requests a follow-up run once it finishes. The new task is published
    /// as latest before this returns.
    pub async fn start_run(&self) -> SendTaskHandle {
        let mut active = self.inner.active.lock().await;
        if let Some(handle) = active.handle.clone() {
            active.rerun_requested = true;
            debug!("{} already running, trigger coalesced", handle.id());
            return handle;
        }

        let (run, handle) = self.inner.begin_run(&mut active);
        self.inner.busy_tx.send_replace(true);
        drop(active);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let worker = tokio::spawn(inner.clone().drive(run));
            if let Err(e) = worker.await {
                inner.release_after_crash(e).await;
            }
        });
        handle
    }

    /// Live view of the most recently published task.
    ///
    /// Starts with the `Idle` placeholder until the first run.
    pub fn latest(&self) -> watch::Receiver<SendTask> {
        self.inner.latest_tx.subscribe()
    }

    pub fn current_task(&self) -> SendTask {
        self.inner.latest_tx.borrow().clone()
    }

    /// Wait until no run is active, including any follow-up runs.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.busy_tx.subscribe();
        let _ = rx.wait_for(|busy| !*busy).await;
    }
}

impl Inner {
    fn begin_run(&self, active: &mut ActiveRun) -> (Run, SendTaskHandle) {
        let id = TaskId(self.next_task_id.fetch_add(1, Ordering::Relaxed));
        let task = SendTask::running(id);
        let (tx, rx) = watch::channel(task.clone());
        let tx = Arc::new(tx);
        let handle = SendTaskHandle::new(id, rx);

        self.latest_tx.send_replace(task.clone());
        active.handle = Some(handle.clone());
        active.tx = Some(tx.clone());
        active.rerun_requested = false;
        (Run { task, tx }, handle)
    }

    async fn drive(self: Arc<Self>, mut run: Run) {
        loop {
            let aborted = self.execute(&mut run).await;

            let mut active = self.active.lock().await;
            if active.rerun_requested && !aborted && self.has_queued().await {
                let (next, _) = self.begin_run(&mut active);
                info!("{} follows {} for messages queued during it", next.task.id, run.task.id);
                run = next;
                continue;
            }
            active.handle = None;
            active.tx = None;
            active.rerun_requested = false;
            self.busy_tx.send_replace(false);
            break;
        }
    }

    /// Clear the run flag after the worker died mid-run, failing its task
    /// so waiters see a terminal state and later triggers can start a run.
    async fn release_after_crash(&self, err: JoinError) {
        error!("dispatch worker stopped: {err}");
        let mut active = self.active.lock().await;
        if let Some(tx) = active.tx.take() {
            let mut task = tx.borrow().clone();
            if !task.is_terminal() {
                task.abort("dispatch worker stopped");
                tx.send_replace(task.clone());
                self.latest_tx.send_replace(task);
            }
        }
        active.handle = None;
        active.rerun_requested = false;
        self.busy_tx.send_replace(false);
    }

    async fn has_queued(&self) -> bool {
        match self.store.has_queued().await {
            Ok(queued) => queued,
            Err(e) => {
                warn!("could not check for queued messages: {e}");
                false
            }
        }
    }

    /// Attempt every message of one snapshot. Returns true if the run aborted.
    async fn execute(&self, run: &mut Run) -> bool {
        let snapshot = match self.store.query_queued().await {
            Ok(snapshot) => snapshot,
            Err(e) => return self.abort(run, &e.to_string()),
        };
        run.task.total = snapshot.len();
        run.publish(&self.latest_tx);
        info!("{} started with {} queued message(s)", run.task.id, snapshot.len());

        let mut consecutive_failures = 0u32;
        for message in snapshot {
            let claimed = if message.send_status.can_send() {
                self.store.claim(message.id).await
            } else {
                Ok(false)
            };
            match claimed {
                Ok(true) => {}
                Ok(false) => {
                    debug!("message {} left the queue before its turn, skipping", message.id);
                    run.task.total -= 1;
                    run.publish(&self.latest_tx);
                    continue;
                }
                Err(e) => return self.abort(run, &e.to_string()),
            }

            let result = self
                .send_one(message.id, &message.address, &message.body)
                .await;
            let fatal = result.as_ref().err().filter(|e| e.is_fatal()).map(ToString::to_string);
            let outcome = status::on_send_result(result.map_err(|e| e.to_string()));
            let sent = outcome.send_status == SendStatus::Sent;

            if let Err(e) = self.store.update_status(message.id, outcome.into()).await {
                error!("could not record outcome of message {}: {e}", message.id);
                return self.abort(run, &e.to_string());
            }

            if sent {
                run.task.sent += 1;
                consecutive_failures = 0;
            } else {
                run.task.failed += 1;
                consecutive_failures += 1;
            }
            run.publish(&self.latest_tx);

            if let Some(reason) = fatal {
                return self.abort(run, &reason);
            }
            let limit = self.config.abort_after_consecutive_failures;
            if limit > 0 && consecutive_failures >= limit {
                return self.abort(run, &format!("{consecutive_failures} consecutive send failures"));
            }
        }

        run.task.complete();
        run.publish(&self.latest_tx);
        match &run.task.error {
            None => info!("{} finished: {} sent", run.task.id, run.task.sent),
            Some(e) => warn!("{} finished: {e}", run.task.id),
        }
        false
    }

    async fn send_one(&self, id: i64, address: &str, body: &str) -> Result<(), TransportError> {
        debug!("sending message {id} to {address}");
        let result = self.transport.send(id, address, body).await;
        if let Err(e) = &result {
            warn!("message {id} failed: {e}");
        }
        result
    }

    fn abort(&self, run: &mut Run, reason: &str) -> bool {
        error!("{} aborted: {reason}", run.task.id);
        run.task.abort(reason);
        run.publish(&self.latest_tx);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskState;
    use async_trait::async_trait;
    use sms_core::config::DatabaseConfig;
    use sms_models::{Database, OutgoingMessage};
    use std::time::Duration;
    use tempfile::TempDir;

    struct FailFor(&'static str);

    #[async_trait]
    impl Transport for FailFor {
        async fn send(&self, _: i64, address: &str, _: &str) -> Result<(), TransportError> {
            if address == self.0 {
                Err(TransportError::Failed("no service".into()))
            } else {
                Ok(())
            }
        }
    }

    struct Crashes;

    #[async_trait]
    impl Transport for Crashes {
        async fn send(&self, _: i64, _: &str, _: &str) -> Result<(), TransportError> {
            panic!("radio driver crashed");
        }
    }

    fn setup(transport: Arc<dyn Transport>) -> (Dispatcher, MessageStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Database::init(&dir.path().join("d.db"), &DatabaseConfig::default()).unwrap();
        let store = MessageStore::new(db).unwrap();
        let dispatcher = Dispatcher::new(store.clone(), transport, DispatchConfig::default());
        (dispatcher, store, dir)
    }

    #[tokio::test]
    async fn test_latest_starts_idle() {
        let (dispatcher, _store, _dir) = setup(Arc::new(FailFor("")));
        assert_eq!(dispatcher.latest().borrow().state, TaskState::Idle);
    }

    #[tokio::test]
    async fn test_empty_queue_succeeds() {
        let (dispatcher, _store, _dir) = setup(Arc::new(FailFor("")));
        let task = dispatcher.start_run().await.wait().await;
        assert_eq!(task.state, TaskState::Success);
        assert_eq!(task.total, 0);
    }

    #[tokio::test]
    async fn test_run_is_published_before_sending() {
        let (dispatcher, store, _dir) = setup(Arc::new(FailFor("A")));
        store.insert(&[OutgoingMessage::new("A", "hi")]).await.unwrap();
        let handle = dispatcher.start_run().await;
        let latest = dispatcher.current_task();
        assert_eq!(latest.id, handle.id());
        assert!(latest.state == TaskState::Running || latest.is_terminal());

        let task = tokio::time::timeout(Duration::from_secs(5), handle.wait()).await.unwrap();
        assert_eq!(task.error.as_deref(), Some("1 of 1 messages failed"));
        dispatcher.wait_idle().await;
    }

    #[tokio::test]
    async fn test_crashed_worker_releases_the_run() {
        let (dispatcher, store, _dir) = setup(Arc::new(Crashes));
        store.insert(&[OutgoingMessage::new("A", "hi")]).await.unwrap();

        let first = dispatcher.start_run().await;
        let task = tokio::time::timeout(Duration::from_secs(5), first.wait()).await.unwrap();
        assert_eq!(task.state, TaskState::Failed);
        assert!(task.error.as_deref().unwrap().ends_with("run aborted: dispatch worker stopped"));
        tokio::time::timeout(Duration::from_secs(5), dispatcher.wait_idle()).await.unwrap();
        assert_eq!(dispatcher.current_task().id, first.id());

        // The crashed send stays in `sending`, so the next run finds nothing queued.
        let second = dispatcher.start_run().await;
        assert_ne!(second.id(), first.id());
        let task = tokio::time::timeout(Duration::from_secs(5), second.wait()).await.unwrap();
        assert_eq!(task.state, TaskState::Success);
        assert_eq!(task.total, 0);
    }
}
