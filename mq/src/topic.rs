//! Topic resolution from alert subjects
//!
//! Devices send subjects like `Person Detected from Front Door at 10:32pm`.
//! The text before "Detected from" names what was detected and becomes the
//! topic suffix; the text between "Detected from" and "at" names the camera.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

static CATEGORY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Detected from (.*) at").expect("category pattern is valid"));

static SUBJECT_KIND_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.*) Detected from").expect("subject kind pattern is valid"));

/// Characters MQTT forbids in a publish topic name
const FORBIDDEN_TOPIC_CHARS: [char; 3] = ['+', '#', '\0'];

/// Why a subject could not be turned into a topic
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedSubjectError {
    #[error("Message has no subject")]
    Missing,

    #[error("Subject does not name a camera (expected \"... Detected from CAMERA at ...\"): {subject}")]
    MissingCategory { subject: String },

    #[error("Subject does not name a detected thing (expected \"THING Detected from ...\"): {subject}")]
    MissingSubjectKind { subject: String },

    #[error("Subject yields invalid topic '{topic}': {reason}")]
    InvalidTopic { topic: String, reason: String },
}

/// Topic and labels derived from one subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTopic {
    /// Camera or other source named in the subject
    pub category: String,

    /// Detected thing, case preserved
    pub subject_kind: String,

    /// Lowercased subject kind, the topic suffix
    pub suffix: String,

    /// Full topic: `<prefix>/<suffix>`
    pub topic: String,
}

/// Derives topics from subjects under a fixed prefix
#[derive(Debug, Clone)]
pub struct TopicResolver {
    prefix: String,
}

impl TopicResolver {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Resolve a subject into its topic
    ///
    /// Pure: the same subject and prefix always give the same result.
    pub fn resolve(&self, subject: Option<&str>) -> Result<ResolvedTopic, MalformedSubjectError> {
        let subject = subject.ok_or(MalformedSubjectError::Missing)?;

        let category = CATEGORY_PATTERN
            .captures(subject)
            .and_then(|caps| caps.get(1))
            .ok_or_else(|| MalformedSubjectError::MissingCategory {
                subject: subject.to_string(),
            })?
            .as_str()
            .to_string();

        let subject_kind = SUBJECT_KIND_PATTERN
            .captures(subject)
            .and_then(|caps| caps.get(1))
            .ok_or_else(|| MalformedSubjectError::MissingSubjectKind {
                subject: subject.to_string(),
            })?
            .as_str()
            .to_string();

        let suffix = subject_kind.to_lowercase();
        let topic = format!("{}/{}", self.prefix, suffix);

        if suffix.is_empty() {
            return Err(MalformedSubjectError::InvalidTopic {
                topic,
                reason: "detected thing is empty".to_string(),
            });
        }
        if let Some(c) = suffix.chars().find(|c| FORBIDDEN_TOPIC_CHARS.contains(c)) {
            return Err(MalformedSubjectError::InvalidTopic {
                topic,
                reason: format!("contains forbidden character {:?}", c),
            });
        }

        debug!(%category, %subject_kind, %topic, "TopicResolver::resolve");
        Ok(ResolvedTopic {
            category,
            subject_kind,
            suffix,
            topic,
        })
    }
}
