//! Payloads published to the bus

use serde::{Deserialize, Serialize};

use crate::topic::ResolvedTopic;

/// JSON body published for each accepted event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    /// Raw subject line
    pub subject: String,

    /// Camera named in the subject
    #[serde(rename = "camera")]
    pub category: String,

    /// Detected thing, case preserved
    #[serde(rename = "detected_thing")]
    pub subject_kind: String,

    /// Name of the saved image, when one was written
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub filename: Option<String>,
}

impl EventPayload {
    pub fn new(subject: &str, resolved: &ResolvedTopic) -> Self {
        Self {
            subject: subject.to_string(),
            category: resolved.category.clone(),
            subject_kind: resolved.subject_kind.clone(),
            filename: None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::TopicResolver;

    fn resolved() -> ResolvedTopic {
        TopicResolver::new("mqtt")
            .resolve(Some("Person Detected from Front Door at 10:32pm"))
            .unwrap()
    }

    #[test]
    fn test_serialize_without_filename() {
        let payload = EventPayload::new("Person Detected from Front Door at 10:32pm", &resolved());
        let json: serde_json::Value = serde_json::from_slice(&payload.to_json().unwrap()).unwrap();

        assert_eq!(json["subject"], "Person Detected from Front Door at 10:32pm");
        assert_eq!(json["camera"], "Front Door");
        assert_eq!(json["detected_thing"], "Person");
        assert!(json.get("filename").is_none());
    }

    #[test]
    fn test_serialize_with_filename() {
        let mut payload = EventPayload::new("Person Detected from Front Door at 10:32pm", &resolved());
        payload.filename = Some("Front Door-snap.jpg".to_string());
        let json: serde_json::Value = serde_json::from_slice(&payload.to_json().unwrap()).unwrap();

        assert_eq!(json["filename"], "Front Door-snap.jpg");
    }
}
