//! Message handler trait and SMTP replies

use std::fmt;

use async_trait::async_trait;

use crate::message::InboundMessage;

/// An SMTP reply: a three digit code and one or more text lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            lines: vec![text.into()],
        }
    }

    /// Multi-line reply (EHLO capabilities)
    pub fn multiline(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// `250` with the given text
    pub fn ok(text: impl Into<String>) -> Self {
        Self::new(250, text)
    }

    /// True for 2xx and 3xx codes
    pub fn is_positive(&self) -> bool {
        self.code < 400
    }

    /// Render to wire format, CRLF terminated
    pub fn to_wire(&self) -> String {
        let mut out = String::new();
        let last = self.lines.len().saturating_sub(1);
        for (i, line) in self.lines.iter().enumerate() {
            let sep = if i == last { ' ' } else { '-' };
            out.push_str(&format!("{}{}{}\r\n", self.code, sep, line));
        }
        if self.lines.is_empty() {
            out.push_str(&format!("{}\r\n", self.code));
        }
        out
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.lines.join(" "))
    }
}

/// Receives each fully decoded message
///
/// The returned reply is sent to the client verbatim, so implementations
/// decide whether the device sees acceptance or rejection.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle_message(&self, message: InboundMessage) -> Reply;
}
