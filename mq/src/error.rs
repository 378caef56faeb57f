//! Error types for the mail bridge

use std::path::PathBuf;

use smtpintake::Reply;
use thiserror::Error;

use crate::topic::MalformedSubjectError;

/// Writing an attachment to disk failed
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Failed to create attachment directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write attachment {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why an inbound message was not turned into an event
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Malformed(#[from] MalformedSubjectError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Debounce controller is not running")]
    ControllerUnavailable,
}

impl BridgeError {
    /// SMTP reply reported to the sending client
    pub fn reply(&self) -> Reply {
        match self {
            BridgeError::Malformed(e) => Reply::new(554, format!("Transaction failed: {}", e)),
            BridgeError::Persistence(_) => Reply::new(451, "Requested action aborted: local error in processing"),
            BridgeError::ControllerUnavailable => Reply::new(421, "Service not available, closing transmission channel"),
        }
    }
}
