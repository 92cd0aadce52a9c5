//! Message status enums and their transition rules.
//!
//! State transitions for `SendStatus`:
//! - Queued -> Sending -> Sent
//! - Queued -> Sending -> Failed -> (reset) -> Queued
//!
//! `DeliveryStatus` leaves `Unknown` at most once, and only after the
//! message is `Sent`. Everything in this module is pure; persistence lives
//! in `queries`.

use serde::{Deserialize, Serialize};

/// Lifecycle stage of a message's submission to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    /// Waiting for the next dispatch run.
    Queued,
    /// Claimed by a run and handed to the transport.
    Sending,
    /// Accepted by the transport.
    Sent,
    /// Rejected by the transport; eligible for an explicit reset.
    Failed,
}

impl SendStatus {
    /// Parse the persisted representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "sending" => Some(Self::Sending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Persisted representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    /// Only queued messages may be handed to the transport.
    pub fn can_send(self) -> bool {
        matches!(self, Self::Queued)
    }

    /// Status after an explicit reset. Only `Failed` moves (back to `Queued`).
    pub fn on_reset(self) -> Self {
        match self {
            Self::Failed => Self::Queued,
            other => other,
        }
    }
}

impl std::fmt::Display for SendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Post-send confirmation stage of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// No report received (possibly never will be).
    Unknown,
    /// The platform reported delivery.
    Delivered,
    /// The platform reported a delivery failure.
    Failed,
}

impl DeliveryStatus {
    /// Parse the persisted representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(Self::Unknown),
            "delivered" => Some(Self::Delivered),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Persisted representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statuses to persist once the transport has answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub send_status: SendStatus,
    pub delivery_status: DeliveryStatus,
    pub error: Option<String>,
}

/// Map a transport answer to the statuses to persist.
pub fn on_send_result(result: Result<(), String>) -> SendOutcome {
    match result {
        Ok(()) => SendOutcome {
            send_status: SendStatus::Sent,
            delivery_status: DeliveryStatus::Unknown,
            error: None,
        },
        Err(error) => SendOutcome {
            send_status: SendStatus::Failed,
            delivery_status: DeliveryStatus::Unknown,
            error: Some(error),
        },
    }
}

/// Delivery status implied by a platform report.
///
/// Returns `None` when the report must be ignored: the message is not
/// `Sent` yet (early callback) or was never sent.
pub fn on_delivery_report(current: SendStatus, delivered: bool) -> Option<DeliveryStatus> {
    if current != SendStatus::Sent {
        return None;
    }
    Some(if delivered {
        DeliveryStatus::Delivered
    } else {
        DeliveryStatus::Failed
    })
}
