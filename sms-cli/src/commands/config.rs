//! Config command: write the effective configuration to disk.

use std::path::{Path, PathBuf};

use console::style;
use tracing::info;

use sms_core::config::{AppConfig, ConfigHandle};
use sms_core::error::{SmsError, SmsResult};

use crate::OutputFormat;

/// Write `config` to `path`. An existing file is kept unless `force` is set.
///
/// Returns whether the file was written.
pub fn write_config(config: &AppConfig, path: &Path, force: bool) -> SmsResult<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    config.save_to_file(path)?;
    info!("wrote configuration to {}", path.display());
    Ok(true)
}

pub async fn init(
    config: ConfigHandle,
    path: Option<PathBuf>,
    force: bool,
    format: OutputFormat,
) -> SmsResult<()> {
    let path = match path {
        Some(path) => path,
        None => AppConfig::default_config_path()?,
    };
    let written = write_config(&*config.read().await, &path, force)?;

    match format {
        OutputFormat::Json => {
            let out = serde_json::json!({ "path": path, "written": written });
            println!("{}", serde_json::to_string_pretty(&out).map_err(SmsError::from)?);
        }
        OutputFormat::Text if written => {
            println!("  {} {}", style("WROTE").green().bold(), path.display());
        }
        OutputFormat::Text => {
            println!(
                "  {} {} already exists (use --force to overwrite)",
                style("KEPT").yellow().bold(),
                path.display()
            );
        }
    }
    Ok(())
}
