//! Debounce controller
//!
//! Owns the reset schedule. Events and timer expiries arrive on one channel
//! and are handled strictly one at a time, so the "is a reset pending"
//! check, the cancel, and the re-arm for a topic never interleave with
//! another event or an expiry for the same topic.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::handle::ControllerHandle;
use super::messages::{ControllerRequest, Delivery, PendingEvent};
use super::schedule::ResetSchedule;
use crate::bus::PublisherHandle;
use crate::config::Config;
use crate::error::PersistenceError;
use crate::gate::{AttachmentPolicy, AttachmentStore};
use crate::payload::EventPayload;

/// Controller settings
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Quiet period after the last event before a reset; zero disables resets
    pub window: Duration,

    /// Published to a topic when its window elapses
    pub reset_payload: String,

    pub policy: AttachmentPolicy,

    /// Buffer size of the request channel
    pub channel_buffer: usize,
}

impl ControllerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            window: config.reset.window(),
            reset_payload: config.reset.payload.clone(),
            policy: AttachmentPolicy::from(&config.attachments),
            channel_buffer: 256,
        }
    }
}

/// Serializes event handling and reset timers for every topic
pub struct DebounceController {
    config: ControllerConfig,
    store: AttachmentStore,
    publisher: PublisherHandle,
    tx: mpsc::Sender<ControllerRequest>,
    rx: mpsc::Receiver<ControllerRequest>,
}

impl DebounceController {
    pub fn new(config: ControllerConfig, store: AttachmentStore, publisher: PublisherHandle) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_buffer.max(1));
        Self {
            config,
            store,
            publisher,
            tx,
            rx,
        }
    }

    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle::new(self.tx.clone())
    }

    /// Run until `shutdown` is cancelled or a shutdown request arrives
    ///
    /// Pending resets are dropped on exit.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut schedule = ResetSchedule::new();
        info!(window = ?self.config.window, "Debounce controller started");

        loop {
            let request = tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("DebounceController::run: cancelled");
                    break;
                }
                request = self.rx.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            match request {
                ControllerRequest::Event { event, reply } => {
                    let result = self.on_event(&mut schedule, event).await;
                    let _ = reply.send(result);
                }

                ControllerRequest::ResetElapsed { topic, generation } => {
                    self.on_reset_elapsed(&mut schedule, topic, generation).await;
                }

                ControllerRequest::ArmedTopics { reply } => {
                    let _ = reply.send(schedule.topics());
                }

                ControllerRequest::Shutdown => {
                    info!("Debounce controller shutting down");
                    break;
                }
            }
        }

        let dropped = schedule.clear();
        if dropped > 0 {
            warn!(dropped, "Dropped pending resets on shutdown");
        }
        info!("Debounce controller stopped");
    }

    async fn on_event(
        &self,
        schedule: &mut ResetSchedule,
        event: PendingEvent,
    ) -> Result<Delivery, PersistenceError> {
        let topic = event.resolved.topic.clone();
        let already_triggered = schedule.is_armed(&topic);
        let mut payload = EventPayload::new(&event.subject, &event.resolved);

        if self.config.policy.should_persist(&topic, schedule) {
            debug!(%topic, already_triggered, "Saving attachments");
            payload.filename = self
                .store
                .save_images(&event.resolved.category, &event.attachments)
                .await?;
        } else if !event.attachments.is_empty() {
            debug!(%topic, already_triggered, "Not saving attachments");
        }

        match payload.to_json() {
            Ok(bytes) => {
                self.publisher.enqueue(&topic, bytes).await;
            }
            Err(e) => error!(%topic, error = %e, "Failed to encode event payload"),
        }

        let replaced_pending_reset = schedule.cancel(&topic);
        let reset_armed = if self.config.window.is_zero() {
            false
        } else {
            schedule.schedule(&topic, self.config.window, self.tx.clone());
            true
        };

        Ok(Delivery {
            topic,
            filename: payload.filename,
            replaced_pending_reset,
            reset_armed,
        })
    }

    async fn on_reset_elapsed(&self, schedule: &mut ResetSchedule, topic: String, generation: u64) {
        if !schedule.take_if_current(&topic, generation) {
            debug!(%topic, generation, "Ignoring stale reset timer");
            return;
        }

        info!(%topic, payload = %self.config.reset_payload, "Resetting topic");
        self.publisher
            .enqueue(&topic, self.config.reset_payload.clone().into_bytes())
            .await;
    }
}
