//! CLI command implementations.

pub mod config;
pub mod listen;
pub mod messages;
pub mod send;

use std::sync::Arc;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing::warn;

use sms_core::config::ConfigHandle;
use sms_core::error::SmsResult;
use sms_models::Database;
use sms_services::{
    MessageStore, SendTask, SendTaskHandle, SimulatedTransport, SmsSenderRepository, TaskState,
    TimeoutTransport,
};

use crate::OutputFormat;

/// Helper to initialize the database from config.
pub async fn init_database(config: &ConfigHandle) -> SmsResult<Database> {
    let config = config.read().await;
    let db_path = config.effective_db_path()?;
    Database::init(&db_path, &config.database)
}

/// Helper to open the message store from config.
pub async fn open_store(config: &ConfigHandle) -> SmsResult<MessageStore> {
    MessageStore::new(init_database(config).await?)
}

/// Wire the repository over the simulated radio.
///
/// Delivery reports from the radio are applied in the background, and
/// sends a previous process left unfinished are failed before returning.
pub async fn build_repository(config: &ConfigHandle) -> SmsResult<SmsSenderRepository> {
    let store = open_store(config).await?;
    let config = config.read().await.clone();

    let (reports_tx, reports_rx) = mpsc::channel(config.dispatch.delivery_channel_capacity);
    let radio = SimulatedTransport::new(&config.transport).with_delivery_reports(reports_tx);
    let transport = Arc::new(TimeoutTransport::new(radio, config.transport.send_timeout()));

    let repo = SmsSenderRepository::with_transport(store, transport, config.dispatch.clone());
    repo.spawn_delivery_listener(reports_rx);

    let interrupted = repo.recover_interrupted().await?;
    if interrupted > 0 {
        warn!("{interrupted} message(s) were interrupted by a previous run; use `retry` to resend");
    }
    Ok(repo)
}

/// Follow a run with a progress bar until it ends, then wait out any
/// follow-up run and the delivery reports still in flight.
pub async fn wait_for_run(
    repo: &SmsSenderRepository,
    handle: SendTaskHandle,
    config: &ConfigHandle,
) -> SendTask {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {spinner} [{bar:30}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let mut latest = repo.latest_send_task();
    let done = handle.wait();
    tokio::pin!(done);
    let task = loop {
        tokio::select! {
            task = &mut done => break task,
            changed = latest.changed() => {
                if changed.is_err() {
                    break (&mut done).await;
                }
                let current = latest.borrow_and_update().clone();
                pb.set_length(current.total as u64);
                pb.set_position(current.attempted() as u64);
                pb.set_message(status_line(&current));
            }
        }
    };
    pb.finish_and_clear();

    repo.wait_idle().await;
    // Reports for the last sends trail them by one radio latency.
    let latency = config.read().await.transport.simulated_latency();
    tokio::time::sleep(latency * 2).await;
    task
}

/// One-line status as shown to the user: progress while running, the
/// error of a failed run otherwise.
pub fn status_line(task: &SendTask) -> String {
    match task.state {
        TaskState::Idle => "Idle".to_string(),
        TaskState::Running => format!("Sending… ({}/{})", task.attempted(), task.total),
        TaskState::Success => format!("All {} message(s) sent", task.sent),
        TaskState::Failed => task.error.clone().unwrap_or_else(|| "Failed".to_string()),
    }
}

/// Print a finished (or current) task in the selected format.
pub fn print_task(task: &SendTask, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(task).unwrap_or_default());
        }
        OutputFormat::Text => {
            let label = match task.state {
                TaskState::Success => style("OK").green().bold(),
                TaskState::Failed => style("FAILED").red().bold(),
                TaskState::Running => style("RUNNING").cyan().bold(),
                TaskState::Idle => style("IDLE").dim(),
            };
            println!("  {} {}: {}", label, task.id, status_line(task));
        }
    }
}

/// Truncate a string to a maximum number of characters, appending an ellipsis if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len > 3 {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    } else {
        s.chars().take(max_len).collect()
    }
}
