//! MIME decoding of raw DATA payloads

use mail_parser::{MessageParser, MimeHeaders};
use tracing::debug;

use crate::message::{Attachment, InboundMessage};

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Decode the raw bytes received after `DATA` into an [`InboundMessage`]
///
/// Never fails: an unparseable payload yields a message with no subject, which
/// the handler is expected to reject.
pub fn decode_message(sender: &str, recipients: &[String], raw: &[u8]) -> InboundMessage {
    let mut inbound = InboundMessage {
        sender: sender.to_string(),
        recipients: recipients.to_vec(),
        ..Default::default()
    };

    let Some(message) = MessageParser::default().parse(raw) else {
        debug!(len = raw.len(), "decode_message: payload is not a parseable message");
        inbound.body_text = String::from_utf8_lossy(raw).into_owned();
        return inbound;
    };

    inbound.subject = message.subject().map(str::to_string);
    inbound.body_text = message.body_text(0).map(|text| text.into_owned()).unwrap_or_default();

    for (index, part) in message.attachments().enumerate() {
        let filename = part
            .attachment_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("attachment-{}", index + 1));
        let mime_type = part
            .content_type()
            .map(|ct| match ct.subtype() {
                Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
                None => ct.ctype().to_string(),
            })
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

        debug!(%filename, %mime_type, size = part.contents().len(), "decode_message: attachment");
        inbound
            .attachments
            .push(Attachment::new(filename, mime_type.to_lowercase(), part.contents()));
    }

    inbound
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT_MAIL: &str = "From: camera@example.com\r\n\
To: alerts@example.com\r\n\
Subject: Person Detected from Front Door at 10:32pm\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n\
\r\n\
--XYZ\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Motion event on channel 1\r\n\
--XYZ\r\n\
Content-Type: image/jpeg; name=\"snap.jpg\"\r\n\
Content-Disposition: attachment; filename=\"snap.jpg\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
aGVsbG8=\r\n\
--XYZ--\r\n";

    #[test]
    fn test_decode_subject_and_body() {
        let msg = decode_message("camera@example.com", &["alerts@example.com".to_string()], SNAPSHOT_MAIL.as_bytes());

        assert_eq!(msg.sender, "camera@example.com");
        assert_eq!(msg.recipients, vec!["alerts@example.com".to_string()]);
        assert_eq!(msg.subject.as_deref(), Some("Person Detected from Front Door at 10:32pm"));
        assert!(msg.body_text.contains("Motion event"));
    }

    #[test]
    fn test_decode_image_attachment() {
        let msg = decode_message("camera@example.com", &[], SNAPSHOT_MAIL.as_bytes());

        assert_eq!(msg.attachments.len(), 1);
        let att = &msg.attachments[0];
        assert_eq!(att.filename, "snap.jpg");
        assert_eq!(att.mime_type, "image/jpeg");
        assert_eq!(att.bytes, b"hello");
    }

    #[test]
    fn test_decode_without_subject() {
        let raw = "From: camera@example.com\r\n\r\nno subject here\r\n";
        let msg = decode_message("camera@example.com", &[], raw.as_bytes());

        assert!(msg.subject.is_none());
        assert!(msg.attachments.is_empty());
    }

    #[test]
    fn test_decode_plain_message_has_no_attachments() {
        let raw = "Subject: Vehicle Detected from Driveway at 08:00\r\n\r\nbody\r\n";
        let msg = decode_message("dvr@example.com", &[], raw.as_bytes());

        assert_eq!(msg.subject.as_deref(), Some("Vehicle Detected from Driveway at 08:00"));
        assert!(msg.attachments.is_empty());
    }
}
