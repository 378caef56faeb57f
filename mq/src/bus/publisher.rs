//! Publisher - worker that owns the bus client
//!
//! Publishes run off the controller's path, one at a time in enqueue order,
//! so an event payload always reaches the bus before the reset that follows it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BusClient, PublishOutcome, publish_best_effort};

/// A payload waiting to be published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Counters reported when the worker stops
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublisherStats {
    pub delivered: u64,
    pub failed: u64,
}

/// Handle to enqueue publishes
#[derive(Clone)]
pub struct PublisherHandle {
    tx: mpsc::Sender<PublishRequest>,
}

impl PublisherHandle {
    /// Queue a publish; returns false when the worker is gone
    ///
    /// Waits for room when the queue is full, so callers slow down to the
    /// broker's pace instead of dropping payloads.
    pub async fn enqueue(&self, topic: &str, payload: Vec<u8>) -> bool {
        let request = PublishRequest {
            topic: topic.to_string(),
            payload,
        };
        if self.tx.send(request).await.is_err() {
            warn!(%topic, "Publisher stopped, dropping payload");
            return false;
        }
        true
    }
}

/// Spawns the publish worker
pub struct Publisher;

impl Publisher {
    /// Spawn the worker; it drains its queue and stops once every handle is dropped
    pub fn spawn(client: Arc<dyn BusClient>, capacity: usize) -> (PublisherHandle, JoinHandle<PublisherStats>) {
        debug!(capacity, "Publisher::spawn: called");
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(worker_loop(client, rx));
        (PublisherHandle { tx }, task)
    }
}

async fn worker_loop(client: Arc<dyn BusClient>, mut rx: mpsc::Receiver<PublishRequest>) -> PublisherStats {
    let mut stats = PublisherStats::default();

    while let Some(request) = rx.recv().await {
        match publish_best_effort(client.as_ref(), &request.topic, &request.payload).await {
            PublishOutcome::Delivered => stats.delivered += 1,
            PublishOutcome::Failed { .. } => stats.failed += 1,
        }
    }

    info!(delivered = stats.delivered, failed = stats.failed, "Publisher stopped");
    stats
}
