//! Bus delivery
//!
//! Everything that leaves the process goes through [`BusClient`]. Delivery is
//! best-effort: [`publish_best_effort`] turns every failure into a logged
//! [`PublishOutcome::Failed`], so no caller can treat a broker outage as fatal.

mod mqtt;
mod publisher;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info};

pub use mqtt::MqttBusClient;
pub use publisher::{PublishRequest, Publisher, PublisherHandle, PublisherStats};

/// Errors from a single delivery attempt
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("MQTT connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    #[error("Publish timed out after {0:?}")]
    Timeout(Duration),

    #[error("Bus unavailable: {0}")]
    Unavailable(String),
}

/// Result of a best-effort publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered,
    Failed { reason: String },
}

impl PublishOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, PublishOutcome::Delivered)
    }
}

/// One-shot publisher to a pub/sub bus
#[async_trait]
pub trait BusClient: Send + Sync {
    /// Attempt a single delivery of `payload` to `topic`
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError>;
}

/// Publish once, logging and swallowing any failure
pub async fn publish_best_effort(client: &dyn BusClient, topic: &str, payload: &[u8]) -> PublishOutcome {
    info!(%topic, payload = %String::from_utf8_lossy(payload), "Publishing");
    match client.publish(topic, payload).await {
        Ok(()) => PublishOutcome::Delivered,
        Err(e) => {
            error!(%topic, error = %e, details = ?e, "Failed publishing");
            PublishOutcome::Failed { reason: e.to_string() }
        }
    }
}
