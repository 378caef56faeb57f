//! Decoded inbound message types

/// A named binary part of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name declared by the sender
    pub filename: String,

    /// Declared media type, e.g. `image/jpeg`
    pub mime_type: String,

    /// Decoded content
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }
}

/// One message received from an SMTP client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    /// Envelope sender (`MAIL FROM`)
    pub sender: String,

    /// Envelope recipients (`RCPT TO`)
    pub recipients: Vec<String>,

    /// Subject header, if present
    pub subject: Option<String>,

    /// Decoded text body, lossy if the body was not valid UTF-8
    pub body_text: String,

    /// Attachments in message order
    pub attachments: Vec<Attachment>,
}

impl InboundMessage {
    /// Build a message directly, bypassing SMTP (used by tests and tooling)
    pub fn new(sender: impl Into<String>, subject: Option<&str>) -> Self {
        Self {
            sender: sender.into(),
            subject: subject.map(str::to_string),
            ..Default::default()
        }
    }

    /// Add an attachment
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}
