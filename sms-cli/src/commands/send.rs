//! Send, demo and retry commands.

use console::style;

use sms_core::config::ConfigHandle;
use sms_core::error::SmsResult;
use sms_models::OutgoingMessage;

use crate::OutputFormat;

/// Default demo destination (the first emulator's number).
pub const DEMO_ADDRESS: &str = "+15555215554";

const SHORT_TEXTS: [&str; 3] = ["Hi!", "Hello!", "Howdy!"];

const LONG_TEXTS: [&str; 3] = [
    "Lorem ipsum dolor sit amet, consectetur adipiscing elit, sed do eiusmod \
     tempor incididunt ut labore et dolore magna aliqua. Ut enim ad minim \
     veniam, quis nostrud exercitation ullamco laboris.",
    "Duis aute irure dolor in reprehenderit in voluptate velit esse cillum \
     dolore eu fugiat nulla pariatur. Excepteur sint occaecat cupidatat non \
     proident, sunt in culpa qui officia deserunt mollit anim id est laborum.",
    "Sed ut perspiciatis unde omnis iste natus error sit voluptatem \
     accusantium doloremque laudantium, totam rem aperiam, eaque ipsa quae ab \
     illo inventore veritatis et quasi architecto beatae vitae dicta sunt explicabo.",
];

/// The demo batch: three short texts, then three long (multipart) ones.
pub fn demo_messages(to: &str) -> Vec<OutgoingMessage> {
    SHORT_TEXTS
        .iter()
        .chain(LONG_TEXTS.iter())
        .map(|text| OutgoingMessage::new(to, *text))
        .collect()
}

pub async fn send(config: ConfigHandle, to: String, text: String, format: OutputFormat) -> SmsResult<()> {
    queue_and_send(config, vec![OutgoingMessage::new(to, text)], format).await
}

pub async fn demo(config: ConfigHandle, to: String, format: OutputFormat) -> SmsResult<()> {
    queue_and_send(config, demo_messages(&to), format).await
}

pub async fn retry(config: ConfigHandle, format: OutputFormat) -> SmsResult<()> {
    let repo = super::build_repository(&config).await?;
    if let OutputFormat::Text = format {
        println!("  {} Retrying failed messages...\n", style("RETRY").cyan().bold());
    }
    let handle = repo.reset_failed_and_retry().await?;
    let task = super::wait_for_run(&repo, handle, &config).await;
    super::print_task(&task, format);
    Ok(())
}

async fn queue_and_send(config: ConfigHandle, messages: Vec<OutgoingMessage>, format: OutputFormat) -> SmsResult<()> {
    let repo = super::build_repository(&config).await?;
    if let OutputFormat::Text = format {
        println!(
            "  {} Queued {} message(s)\n",
            style("SEND").cyan().bold(),
            messages.len()
        );
    }
    let handle = repo.insert_messages_and_send(messages).await?;
    let task = super::wait_for_run(&repo, handle, &config).await;
    super::print_task(&task, format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_batch_order() {
        let batch = demo_messages("5554");
        assert_eq!(batch.len(), 6);
        assert_eq!(batch[0].body, "Hi!");
        assert!(batch[3].body.len() > 160);
        assert!(batch.iter().all(|m| m.address == "5554"));
    }
}
