//! Glue between SMTP intake and the debounce controller

use async_trait::async_trait;
use smtpintake::{InboundMessage, MessageHandler, Reply};
use tracing::{debug, info, warn};

use crate::debounce::{ControllerHandle, Delivery, PendingEvent};
use crate::error::BridgeError;
use crate::topic::TopicResolver;

/// Body characters shown in debug logs
const LOGGED_BODY_CHARS: usize = 350;

/// Turns inbound messages into debounced bus events
#[derive(Clone)]
pub struct Bridge {
    resolver: TopicResolver,
    controller: ControllerHandle,
}

impl Bridge {
    pub fn new(resolver: TopicResolver, controller: ControllerHandle) -> Self {
        Self { resolver, controller }
    }

    /// Resolve and submit one message
    ///
    /// The subject is resolved before anything else happens, so a malformed
    /// subject never touches the disk, the bus, or any timer.
    pub async fn accept(&self, message: InboundMessage) -> Result<Delivery, BridgeError> {
        debug!(sender = %message.sender, recipients = ?message.recipients, "Message received");
        debug!(body = %truncate(&message.body_text, LOGGED_BODY_CHARS), "Message body");

        let resolved = self.resolver.resolve(message.subject.as_deref())?;
        let subject = message.subject.unwrap_or_default();
        info!(%subject, topic = %resolved.topic, "Accepted alert");

        self.controller
            .submit(PendingEvent::new(subject, resolved, message.attachments))
            .await
    }
}

#[async_trait]
impl MessageHandler for Bridge {
    async fn handle_message(&self, message: InboundMessage) -> Reply {
        match self.accept(message).await {
            Ok(_) => Reply::ok("Message accepted for delivery"),
            Err(e) => {
                warn!(error = %e, "Rejecting message");
                e.reply()
            }
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
