//! Message table commands: list, stats, deliver.

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use console::style;

use sms_core::config::ConfigHandle;
use sms_core::error::SmsResult;
use sms_models::{DeliveryStatus, DeliveryUpdate, Message, SendStatus};

use crate::OutputFormat;

pub async fn list(config: ConfigHandle, format: OutputFormat) -> SmsResult<()> {
    let store = super::open_store(&config).await?;
    let messages = store.observe_all().borrow().clone();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&messages)?);
        }
        OutputFormat::Text => {
            if messages.is_empty() {
                println!("  No messages.");
                return Ok(());
            }
            println!("{}", message_table(&messages));
            println!();
            for message in &messages {
                println!("  {}", style(message.debug_line()).dim());
            }
        }
    }
    Ok(())
}

fn message_table(messages: &[Message]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["ID", "To", "Send", "Delivery", "Text", "Error"]);

    for m in messages {
        let send = match m.send_status {
            SendStatus::Sent => Cell::new(m.send_status).fg(Color::Green),
            SendStatus::Failed => Cell::new(m.send_status).fg(Color::Red),
            SendStatus::Sending => Cell::new(m.send_status).fg(Color::Cyan),
            SendStatus::Queued => Cell::new(m.send_status),
        };
        let delivery = match m.delivery_status {
            DeliveryStatus::Delivered => Cell::new(m.delivery_status).fg(Color::Green),
            DeliveryStatus::Failed => Cell::new(m.delivery_status).fg(Color::Red),
            DeliveryStatus::Unknown => Cell::new(m.delivery_status),
        };
        table.add_row(vec![
            Cell::new(m.id),
            Cell::new(&m.address),
            send,
            delivery,
            Cell::new(super::truncate(&m.body, 40)),
            Cell::new(m.error.as_deref().unwrap_or("")),
        ]);
    }
    table
}

pub async fn stats(config: ConfigHandle, format: OutputFormat) -> SmsResult<()> {
    let store = super::open_store(&config).await?;
    let counts = store.counts().await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&counts)?);
        }
        OutputFormat::Text => {
            println!("  Messages:");
            println!("    Queued:          {}", counts.queued);
            println!("    Sending:         {}", counts.sending);
            println!("    Sent:            {}", style(counts.sent).green());
            println!("    Failed:          {}", style(counts.failed).red());
            println!("  Delivery:");
            println!("    Delivered:       {}", counts.delivered);
            println!("    Not delivered:   {}", counts.delivery_failed);
        }
    }
    Ok(())
}

pub async fn deliver(config: ConfigHandle, id: i64, delivered: bool, format: OutputFormat) -> SmsResult<()> {
    let store = super::open_store(&config).await?;
    let result = store.apply_delivery_report(id, delivered).await?;

    match format {
        OutputFormat::Json => {
            let (applied, status) = match result {
                DeliveryUpdate::Applied(status) => (true, Some(status)),
                DeliveryUpdate::Ignored => (false, None),
            };
            println!("{}", serde_json::json!({
                "id": id,
                "applied": applied,
                "delivery_status": status,
            }));
        }
        OutputFormat::Text => match result {
            DeliveryUpdate::Applied(status) => {
                println!("  {} message {id} is now {status}", style("OK").green().bold());
            }
            DeliveryUpdate::Ignored => {
                println!(
                    "  {} report ignored: message {id} is not sent or already has a delivery status",
                    style("SKIP").yellow().bold()
                );
            }
        },
    }
    Ok(())
}
