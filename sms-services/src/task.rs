//! Send task: the aggregate view of one dispatch run.
//!
//! Each run gets a fresh `SendTask`; the dispatcher publishes a new
//! snapshot value on every change and never revives a finished task.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

/// Identifier of one dispatch run. `TaskId(0)` is the idle placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// State of a send task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// No run has been triggered yet.
    Idle,
    Running,
    Success,
    Failed,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failed)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Snapshot of one dispatch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendTask {
    pub id: TaskId,
    pub state: TaskState,
    /// Summary such as "1 of 2 messages failed", set when `state = Failed`.
    pub error: Option<String>,
    /// Messages in this run's snapshot.
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SendTask {
    /// Placeholder published before the first run.
    pub fn idle() -> Self {
        Self {
            id: TaskId(0),
            state: TaskState::Idle,
            error: None,
            total: 0,
            sent: 0,
            failed: 0,
            started_at: None,
            finished_at: None,
        }
    }

    /// A run that has just been triggered, before its snapshot is taken.
    pub fn running(id: TaskId) -> Self {
        Self {
            id,
            state: TaskState::Running,
            started_at: Some(Utc::now()),
            ..Self::idle()
        }
    }

    /// Messages handed to the transport so far.
    pub fn attempted(&self) -> usize {
        self.sent + self.failed
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_running(&self) -> bool {
        self.state == TaskState::Running
    }

    /// Close the run after its whole snapshot was attempted.
    pub(crate) fn complete(&mut self) {
        debug_assert!(!self.is_terminal());
        self.finished_at = Some(Utc::now());
        if self.failed == 0 {
            self.state = TaskState::Success;
            self.error = None;
        } else {
            self.state = TaskState::Failed;
            self.error = Some(format!("{} of {} messages failed", self.failed, self.attempted()));
        }
    }

    /// Close the run early; unattempted messages stay queued.
    pub(crate) fn abort(&mut self, reason: &str) {
        debug_assert!(!self.is_terminal());
        self.finished_at = Some(Utc::now());
        self.state = TaskState::Failed;
        self.error = Some(format!(
            "{} of {} messages failed; run aborted: {reason}",
            self.failed, self.total
        ));
    }
}

/// Handle on one dispatch run.
#[derive(Debug, Clone)]
pub struct SendTaskHandle {
    id: TaskId,
    rx: watch::Receiver<SendTask>,
}

impl SendTaskHandle {
    pub(crate) fn new(id: TaskId, rx: watch::Receiver<SendTask>) -> Self {
        Self { id, rx }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Latest snapshot of this run.
    pub fn current(&self) -> SendTask {
        self.rx.borrow().clone()
    }

    /// Wait until this run reaches a terminal state and return it.
    pub async fn wait(&self) -> SendTask {
        let mut rx = self.rx.clone();
        if let Ok(task) = rx.wait_for(SendTask::is_terminal).await {
            return task.clone();
        }
        // The run's sender is gone; its last value is final.
        let last = rx.borrow().clone();
        last
    }
}
