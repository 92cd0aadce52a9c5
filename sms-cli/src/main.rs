//! SMS Sender CLI - Command-line front end for the outgoing SMS queue.
//!
//! Queues messages, triggers dispatch runs over a simulated radio, and
//! shows the message table and the latest send task. Useful for headless
//! operation, scripting, and exercising the dispatcher end to end.

mod commands;

use clap::{Parser, Subcommand};
use tracing::info;

use sms_core::config::{AppConfig, ConfigHandle};
use sms_core::error::SmsResult;
use sms_core::logging;
use sms_core::platform::Platform;

/// SMS Sender - queue and dispatch outgoing text messages.
#[derive(Parser)]
#[command(
    name = "smssender",
    version,
    about = "Outgoing SMS queue and dispatcher",
    long_about = "A command-line interface for the SMS sender.\n\
                   Messages are stored durably, sent one run at a time, and\n\
                   tracked through send and delivery status."
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json).
    #[arg(short = 'f', long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output for scripting.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue one message and send it.
    Send {
        /// Destination address.
        #[arg(short, long)]
        to: String,
        /// Message text.
        text: String,
    },
    /// Queue a batch of short and long demo texts and send them.
    Demo {
        /// Destination address.
        #[arg(short, long, default_value = commands::send::DEMO_ADDRESS)]
        to: String,
    },
    /// Return failed messages to the queue and send them again.
    Retry,
    /// List all messages.
    List,
    /// Show per-status message totals.
    Stats,
    /// Record a delivery report for a sent message.
    Deliver {
        /// Message id.
        id: i64,
        /// Report the message as not delivered.
        #[arg(long)]
        failed: bool,
    },
    /// Read JSON send commands from stdin, one per line.
    Listen,
    /// Write the current configuration to a TOML file.
    InitConfig {
        /// Destination file (defaults to the platform config path).
        #[arg(long)]
        path: Option<std::path::PathBuf>,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> SmsResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match cli.config.as_deref() {
        Some(path) => AppConfig::load_from_file(std::path::Path::new(path))?,
        None => AppConfig::load_default()?,
    };

    // Initialize logging
    let log_level = if cli.verbose { "debug".to_string() } else { config.logging.level.clone() };
    let log_dir = config.effective_log_dir()?;
    let _guard = logging::init_logging(&log_level, &log_dir, config.logging.json_output)?;

    let config_handle = ConfigHandle::new(config);

    info!("SMS Sender CLI v{} on {}", sms_core::constants::APP_VERSION, Platform::current());

    // Dispatch to command handlers
    match cli.command {
        Commands::Send { to, text } => {
            commands::send::send(config_handle, to, text, cli.format).await
        }
        Commands::Demo { to } => {
            commands::send::demo(config_handle, to, cli.format).await
        }
        Commands::Retry => {
            commands::send::retry(config_handle, cli.format).await
        }
        Commands::List => {
            commands::messages::list(config_handle, cli.format).await
        }
        Commands::Stats => {
            commands::messages::stats(config_handle, cli.format).await
        }
        Commands::Deliver { id, failed } => {
            commands::messages::deliver(config_handle, id, !failed, cli.format).await
        }
        Commands::Listen => {
            commands::listen::run(config_handle, cli.format).await
        }
        Commands::InitConfig { path, force } => {
            commands::config::init(config_handle, path, force, cli.format).await
        }
    }
}
