//! Send commands arriving from a remote or local command source.

use serde::{Deserialize, Serialize};

use sms_core::error::{SmsError, SmsResult};
use sms_models::OutgoingMessage;

/// One `(address, body)` pair from the command channel.
///
/// The wire form is `{"number": "...", "sms": "..."}`; `address` and
/// `body` are accepted as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendCommand {
    #[serde(rename = "number", alias = "address")]
    pub address: String,
    #[serde(rename = "sms", alias = "body")]
    pub body: String,
}

impl SendCommand {
    /// Parse and validate one JSON command.
    pub fn from_json(payload: &str) -> SmsResult<Self> {
        let command: Self = serde_json::from_str(payload)
            .map_err(|e| SmsError::InvalidCommand(e.to_string()))?;
        command.validate()?;
        Ok(command)
    }

    pub fn validate(&self) -> SmsResult<()> {
        if self.address.trim().is_empty() {
            return Err(SmsError::InvalidCommand("empty address".into()));
        }
        if self.body.is_empty() {
            return Err(SmsError::InvalidCommand("empty body".into()));
        }
        Ok(())
    }
}

impl From<SendCommand> for OutgoingMessage {
    fn from(command: SendCommand) -> Self {
        OutgoingMessage::new(command.address.trim(), command.body)
    }
}
