//! Listen command: a line-oriented command channel on stdin.
//!
//! Each line is one JSON send command, e.g. `{"number": "5554", "sms": "Hi!"}`.
//! Every accepted command is queued and triggers a run; task progress is
//! printed as it changes.

use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, warn};

use sms_core::config::ConfigHandle;
use sms_core::error::SmsResult;
use sms_services::{SendCommand, SmsSenderRepository, TaskId};

use crate::OutputFormat;

/// What became of one input line.
#[derive(Debug)]
pub enum LineOutcome {
    Blank,
    /// The line was not a valid send command.
    Rejected(String),
    /// The message was queued and a run triggered (or joined).
    Queued(TaskId),
    /// The command was valid but could not be stored.
    Failed(String),
}

/// Parse one line and queue its message. Never ends the listener.
pub async fn handle_line(repo: &SmsSenderRepository, line: &str) -> LineOutcome {
    let line = line.trim();
    if line.is_empty() {
        return LineOutcome::Blank;
    }
    let command = match SendCommand::from_json(line) {
        Ok(command) => command,
        Err(e) => {
            warn!("rejected command: {e}");
            return LineOutcome::Rejected(e.to_string());
        }
    };
    match repo.insert_messages_and_send(vec![command.into()]).await {
        Ok(handle) => LineOutcome::Queued(handle.id()),
        Err(e) if e.is_storage() => {
            error!("could not queue command: {e}");
            LineOutcome::Failed(e.to_string())
        }
        Err(e) => {
            warn!("could not queue command: {e}");
            LineOutcome::Failed(e.to_string())
        }
    }
}

pub async fn run(config: ConfigHandle, format: OutputFormat) -> SmsResult<()> {
    let repo = super::build_repository(&config).await?;

    if let OutputFormat::Text = format {
        println!(
            "  {} Reading send commands from stdin (one JSON object per line)...\n",
            style("LISTEN").cyan().bold()
        );
    }

    let mut latest = repo.latest_send_task();
    let printer = tokio::spawn(async move {
        while latest.changed().await.is_ok() {
            let task = latest.borrow_and_update().clone();
            super::print_task(&task, format);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match handle_line(&repo, &line).await {
            LineOutcome::Queued(id) => debug!("command queued into {id}"),
            LineOutcome::Rejected(e) if matches!(format, OutputFormat::Text) => {
                println!("  {} {e}", style("REJECTED").red().bold());
            }
            LineOutcome::Failed(e) if matches!(format, OutputFormat::Text) => {
                println!("  {} {e}", style("ERROR").red().bold());
            }
            _ => {}
        }
    }

    repo.wait_idle().await;
    let latency = config.read().await.transport.simulated_latency();
    tokio::time::sleep(latency * 2).await;
    printer.abort();

    if let OutputFormat::Text = format {
        let counts = repo.counts().await?;
        println!("\n  {counts}");
    }
    Ok(())
}
