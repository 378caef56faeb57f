//! SMTP intake error types

use std::time::Duration;
use thiserror::Error;

/// Errors that end an SMTP connection or the listener
#[derive(Debug, Error)]
pub enum SmtpError {
    #[error("Failed to bind SMTP listener on {addr}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Client idle for more than {0:?}")]
    Timeout(Duration),

    #[error("Command line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
}
