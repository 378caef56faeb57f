//! ControllerHandle - thread-safe access to the debounce controller

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::{ControllerRequest, Delivery, PendingEvent};
use crate::error::BridgeError;

/// Cloneable handle for submitting events
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<ControllerRequest>,
}

impl ControllerHandle {
    pub(crate) fn new(tx: mpsc::Sender<ControllerRequest>) -> Self {
        Self { tx }
    }

    /// Submit an event and wait until it has been processed
    pub async fn submit(&self, event: PendingEvent) -> Result<Delivery, BridgeError> {
        debug!(topic = %event.resolved.topic, "ControllerHandle::submit: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ControllerRequest::Event { event, reply: reply_tx })
            .await
            .map_err(|_| BridgeError::ControllerUnavailable)?;

        let result = reply_rx.await.map_err(|_| BridgeError::ControllerUnavailable)?;
        Ok(result?)
    }

    /// Topics with a pending reset
    pub async fn armed_topics(&self) -> Result<Vec<String>, BridgeError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ControllerRequest::ArmedTopics { reply: reply_tx })
            .await
            .map_err(|_| BridgeError::ControllerUnavailable)?;
        reply_rx.await.map_err(|_| BridgeError::ControllerUnavailable)
    }

    /// Ask the controller to stop, dropping pending resets
    pub async fn shutdown(&self) -> Result<(), BridgeError> {
        self.tx
            .send(ControllerRequest::Shutdown)
            .await
            .map_err(|_| BridgeError::ControllerUnavailable)
    }
}
