//! Attachment persistence gate
//!
//! Decides whether an event's image attachments are written to disk and
//! writes them. While a topic's reset is pending the event is a repeat of one
//! already reported, so its images are skipped unless explicitly allowed.

use std::path::{Path, PathBuf};

use smtpintake::Attachment;
use tracing::{debug, info, warn};

use crate::config::AttachmentsConfig;
use crate::debounce::ResetSchedule;
use crate::error::PersistenceError;

/// Characters never allowed in a saved file name
const FORBIDDEN_NAME_CHARS: [char; 3] = ['/', '\\', '\0'];

/// Save switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentPolicy {
    pub save: bool,
    pub save_during_reset: bool,
}

impl AttachmentPolicy {
    /// Whether to persist given if a reset is pending for the topic
    pub fn allows(&self, reset_pending: bool) -> bool {
        self.save && (!reset_pending || self.save_during_reset)
    }

    /// Whether to persist the attachments of an event on `topic`
    pub fn should_persist(&self, topic: &str, schedule: &ResetSchedule) -> bool {
        self.allows(schedule.is_armed(topic))
    }
}

impl From<&AttachmentsConfig> for AttachmentPolicy {
    fn from(config: &AttachmentsConfig) -> Self {
        Self {
            save: config.save,
            save_during_reset: config.save_during_reset,
        }
    }
}

pub fn is_image(attachment: &Attachment) -> bool {
    attachment.mime_type.to_ascii_lowercase().starts_with("image/")
}

/// A bare file name with no directory components
fn is_plain_file_name(name: &str) -> bool {
    !name.contains(FORBIDDEN_NAME_CHARS) && Path::new(name).file_name().is_some_and(|f| f == name)
}

/// Directory images are written to
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    dir: PathBuf,
}

impl AttachmentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory if missing
    pub async fn ensure_dir(&self) -> Result<(), PersistenceError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| PersistenceError::CreateDir {
                path: self.dir.clone(),
                source,
            })
    }

    /// Saved name for an attachment: `<category>-<filename>`
    pub fn output_name(category: &str, filename: &str) -> String {
        format!("{}-{}", category, filename)
    }

    /// Write every image attachment, returning the last saved name
    ///
    /// Non-image attachments and names that would escape the directory are
    /// skipped. The first write error aborts the save.
    pub async fn save_images(
        &self,
        category: &str,
        attachments: &[Attachment],
    ) -> Result<Option<String>, PersistenceError> {
        let mut last_saved = None;

        for attachment in attachments {
            if !is_image(attachment) {
                debug!(filename = %attachment.filename, mime_type = %attachment.mime_type, "Skipping non-image attachment");
                continue;
            }

            let name = Self::output_name(category, &attachment.filename);
            if !is_plain_file_name(&name) {
                warn!(%name, "Skipping attachment with unsafe file name");
                continue;
            }

            let path = self.dir.join(&name);
            info!(filename = %attachment.filename, path = %path.display(), "Saving attached file");
            tokio::fs::write(&path, &attachment.bytes)
                .await
                .map_err(|source| PersistenceError::Write { path, source })?;
            last_saved = Some(name);
        }

        Ok(last_saved)
    }
}
