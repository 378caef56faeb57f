//! SmtpIntake - minimal SMTP receiver for device notification mail
//!
//! Cameras and alarm panels report events by sending mail. This crate accepts
//! those messages over plain SMTP, decodes them into [`InboundMessage`] values
//! and hands each one to a [`MessageHandler`], whose [`Reply`] becomes the
//! SMTP status line returned to the device.
//!
//! # Modules
//!
//! - [`message`] - Decoded message and attachment types
//! - [`decode`] - MIME decoding of raw DATA payloads
//! - [`handler`] - Handler trait and SMTP replies
//! - [`session`] - Per-connection SMTP command state machine
//! - [`server`] - TCP listener and connection tasks

pub mod decode;
pub mod error;
pub mod handler;
pub mod message;
pub mod server;
pub mod session;

pub use decode::decode_message;
pub use error::SmtpError;
pub use handler::{MessageHandler, Reply};
pub use message::{Attachment, InboundMessage};
pub use server::{ServerConfig, SmtpServer};
pub use session::{Action, Session};
