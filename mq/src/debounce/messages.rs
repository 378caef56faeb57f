//! Debounce controller messages

use smtpintake::Attachment;
use tokio::sync::oneshot;

use crate::error::PersistenceError;
use crate::topic::ResolvedTopic;

/// An accepted alert waiting to be processed
#[derive(Debug, Clone)]
pub struct PendingEvent {
    /// Raw subject line
    pub subject: String,
    pub resolved: ResolvedTopic,
    pub attachments: Vec<Attachment>,
}

impl PendingEvent {
    pub fn new(subject: impl Into<String>, resolved: ResolvedTopic, attachments: Vec<Attachment>) -> Self {
        Self {
            subject: subject.into(),
            resolved,
            attachments,
        }
    }
}

/// What the controller did with an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,

    /// Saved image referenced by the payload
    pub filename: Option<String>,

    /// A pending reset for the topic was cancelled
    pub replaced_pending_reset: bool,

    /// A new reset was armed
    pub reset_armed: bool,
}

/// Requests processed one at a time by the controller
#[derive(Debug)]
pub enum ControllerRequest {
    Event {
        event: PendingEvent,
        reply: oneshot::Sender<Result<Delivery, PersistenceError>>,
    },
    ResetElapsed {
        topic: String,
        generation: u64,
    },
    ArmedTopics {
        reply: oneshot::Sender<Vec<String>>,
    },
    Shutdown,
}
