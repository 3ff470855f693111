//! Delivery channel contract and HTTP implementation
//!
//! The scheduler only depends on [`DeliveryChannel`]; the transport lives
//! behind it. A failed send is reported, logged by the caller, and the
//! envelope is dropped. There is no retry queue.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::events::TelemetryEnvelope;

/// Consecutive failures after which the backend counts as unavailable.
const AVAILABILITY_FAILURE_LIMIT: u32 = 5;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("backend endpoint is not configured")]
    NotConfigured,
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend rejected event with status {0}")]
    Rejected(u16),
}

/// Attempts to transmit one envelope, reporting success or failure.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn send(&self, envelope: &TelemetryEnvelope) -> Result<(), DeliveryError>;
}

/// Posts CloudEvents JSON to the configured backend endpoint.
///
/// Tracks consecutive failures so operator-facing surfaces can show
/// backend availability without the scheduler keeping retry state.
pub struct HttpDeliveryChannel {
    client: reqwest::Client,
    endpoint: String,
    consecutive_failures: AtomicU32,
}

impl HttpDeliveryChannel {
    pub fn new(endpoint: &str) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            consecutive_failures: AtomicU32::new(0),
        })
    }

    /// Whether recent sends have been reaching the backend.
    pub fn is_available(&self) -> bool {
        self.consecutive_failures.load(Ordering::Relaxed) < AVAILABILITY_FAILURE_LIMIT
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl DeliveryChannel for HttpDeliveryChannel {
    async fn send(&self, envelope: &TelemetryEnvelope) -> Result<(), DeliveryError> {
        if self.endpoint.is_empty() {
            self.record_failure();
            return Err(DeliveryError::NotConfigured);
        }

        let result = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(envelope)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(event_type = %envelope.event_type, "event delivered");
                self.record_success();
                Ok(())
            }
            Ok(response) => {
                self.record_failure();
                Err(DeliveryError::Rejected(response.status().as_u16()))
            }
            Err(e) => {
                self.record_failure();
                Err(DeliveryError::Transport(e))
            }
        }
    }
}
