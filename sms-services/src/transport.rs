//! Transport port and adapters.
//!
//! The dispatcher hands one message at a time to a `Transport`. The platform
//! radio implements it outside this crate; here live the timeout wrapper
//! applied at bootstrap and a simulated transport for headless use.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use sms_core::config::TransportConfig;
use sms_core::error::TransportError;

/// Asynchronous delivery confirmation for a sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub message_id: i64,
    pub delivered: bool,
}

/// Capability to transmit a single text message.
///
/// `message_id` is passed so the implementation can tag its later
/// delivery callback; address and body are opaque to the dispatcher.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message_id: i64, address: &str, body: &str) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, message_id: i64, address: &str, body: &str) -> Result<(), TransportError> {
        (**self).send(message_id, address, body).await
    }
}

/// Wraps a transport so a send that takes too long counts as a failure.
pub struct TimeoutTransport<T> {
    inner: T,
    timeout: Duration,
}

impl<T: Transport> TimeoutTransport<T> {
    pub fn new(inner: T, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<T: Transport> Transport for TimeoutTransport<T> {
    async fn send(&self, message_id: i64, address: &str, body: &str) -> Result<(), TransportError> {
        match tokio::time::timeout(self.timeout, self.inner.send(message_id, address, body)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("send of message {message_id} timed out after {:?}", self.timeout);
                Err(TransportError::Timeout(self.timeout))
            }
        }
    }
}

/// Stand-in for the platform radio.
///
/// Waits a fixed latency, fails a configurable share of sends, and emits a
/// delivery report for each successful send when a report channel is set.
pub struct SimulatedTransport {
    latency: Duration,
    failure_rate: f64,
    delivery_rate: f64,
    reports: Option<mpsc::Sender<DeliveryReport>>,
}

impl SimulatedTransport {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            latency: config.simulated_latency(),
            failure_rate: config.simulated_failure_rate.clamp(0.0, 1.0),
            delivery_rate: config.simulated_delivery_rate.clamp(0.0, 1.0),
            reports: None,
        }
    }

    /// Send delivery reports for successful sends to this channel.
    pub fn with_delivery_reports(mut self, reports: mpsc::Sender<DeliveryReport>) -> Self {
        self.reports = Some(reports);
        self
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn send(&self, message_id: i64, address: &str, body: &str) -> Result<(), TransportError> {
        // ThreadRng is not Send; draw both outcomes before the first await.
        let (fails, delivered) = {
            let mut rng = rand::thread_rng();
            (rng.gen_bool(self.failure_rate), rng.gen_bool(self.delivery_rate))
        };

        tokio::time::sleep(self.latency).await;

        if address.trim().is_empty() {
            return Err(TransportError::Failed("empty destination address".into()));
        }
        if fails {
            return Err(TransportError::Failed("generic failure".into()));
        }
        debug!("simulated send of message {message_id} to {address} ({} chars)", body.chars().count());

        if let Some(reports) = self.reports.clone() {
            let latency = self.latency;
            tokio::spawn(async move {
                tokio::time::sleep(latency).await;
                if reports.send(DeliveryReport { message_id, delivered }).await.is_err() {
                    debug!("delivery report for message {message_id} dropped: listener closed");
                }
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stalled;

    #[async_trait]
    impl Transport for Stalled {
        async fn send(&self, _: i64, _: &str, _: &str) -> Result<(), TransportError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn fast_config(failure_rate: f64) -> TransportConfig {
        TransportConfig {
            simulated_latency_ms: 1,
            simulated_failure_rate: failure_rate,
            ..TransportConfig::default()
        }
    }

    #[tokio::test]
    async fn test_timeout_becomes_failure() {
        let transport = TimeoutTransport::new(Stalled, Duration::from_millis(500));
        let err = transport.send(1, "A", "hi").await.unwrap_err();
        assert_eq!(err, TransportError::Timeout(Duration::from_millis(500)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_simulated_success_emits_delivery_report() {
        let (tx, mut rx) = mpsc::channel(4);
        let transport = SimulatedTransport::new(&fast_config(0.0)).with_delivery_reports(tx);
        transport.send(9, "5554", "Hi!").await.unwrap();

        let report = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report, DeliveryReport { message_id: 9, delivered: true });
    }

    #[tokio::test]
    async fn test_simulated_failure_rate_one_always_fails() {
        let transport = SimulatedTransport::new(&fast_config(1.0));
        let err = transport.send(1, "5554", "Hi!").await.unwrap_err();
        assert!(matches!(err, TransportError::Failed(_)));
    }

    #[tokio::test]
    async fn test_simulated_rejects_empty_address() {
        let transport = SimulatedTransport::new(&fast_config(0.0));
        assert!(transport.send(1, "  ", "Hi!").await.is_err());
    }

    #[tokio::test]
    async fn test_closed_report_channel_does_not_fail_send() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let transport = SimulatedTransport::new(&fast_config(0.0)).with_delivery_reports(tx);
        assert!(transport.send(3, "5554", "Hi!").await.is_ok());
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
