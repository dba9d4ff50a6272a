//! Pause detection and classification.
//!
//! Classification runs an ordered list of independent predicates over the
//! interrupt value; every predicate that matches overwrites the running label,
//! so the last match wins. Keyword predicates run after the structural ones and
//! can override them (a review pause whose message mentions "video" ends up as
//! `user_input`). Keep the order as is.

use serde_json::Value;

use crate::event::StreamEvent;

/// Semantic type of a pause.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptKind {
    /// Service asks for custom URLs, images, videos or a query.
    UserInput,
    /// Service asks for an approve/edit/reject decision on outfit designs.
    ReviewOutfit,
    /// Any other pause; resumed with an edited copy of its value.
    Generic,
    /// Operator stopped the run; resumed by updating state and rerunning.
    ManualStop,
}

impl InterruptKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InterruptKind::UserInput => "user_input",
            InterruptKind::ReviewOutfit => "review_outfit",
            InterruptKind::Generic => "generic",
            InterruptKind::ManualStop => "manual_stop",
        }
    }
}

impl std::fmt::Display for InterruptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending pause.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Interrupt {
    pub value: Value,
    pub id: Option<String>,
    pub kind: InterruptKind,
    /// Stage the service will run next; recorded for manual stops only.
    pub resume_from: Option<String>,
}

impl Interrupt {
    /// Builds an interrupt from a service descriptor (`{value, id, ...}`).
    /// Descriptors without a `value` field are taken whole.
    pub fn from_descriptor(descriptor: &Value) -> Self {
        let value = descriptor
            .get("value")
            .cloned()
            .unwrap_or_else(|| descriptor.clone());
        let id = descriptor
            .get("id")
            .or_else(|| descriptor.get("interrupt_id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(ToOwned::to_owned);
        let kind = classify(&value);
        Self {
            value,
            id,
            kind,
            resume_from: None,
        }
    }

    /// Pseudo-interrupt standing for an operator stop.
    pub fn manual_stop(snapshot: Value, resume_from: impl Into<String>) -> Self {
        Self {
            value: snapshot,
            id: None,
            kind: InterruptKind::ManualStop,
            resume_from: Some(resume_from.into()),
        }
    }
}

/// Returns the pause carried by an event, if any.
pub fn detect(event: &StreamEvent) -> Option<Interrupt> {
    event.interrupt_descriptor().map(Interrupt::from_descriptor)
}

type Predicate = fn(&Value) -> bool;

/// Evaluated in order; the last matching entry decides.
const CLASSIFIERS: [(Predicate, InterruptKind); 4] = [
    (instructions_request_input, InterruptKind::UserInput),
    (carries_review_payload, InterruptKind::ReviewOutfit),
    (message_mentions_review, InterruptKind::ReviewOutfit),
    (message_mentions_media, InterruptKind::UserInput),
];

const INPUT_INSTRUCTION_KEYS: [&str; 4] = ["custom_urls", "custom_images", "custom_videos", "query"];
const REVIEW_KEYWORDS: [&str; 3] = ["review", "critique", "outfit"];
const MEDIA_KEYWORDS: [&str; 4] = ["url", "image", "video", "custom"];

/// Classifies an interrupt value. Pure: depends on `value` alone.
pub fn classify(value: &Value) -> InterruptKind {
    let mut kind = InterruptKind::Generic;
    for (predicate, label) in CLASSIFIERS {
        if predicate(value) {
            kind = label;
        }
    }
    kind
}

fn instructions_request_input(value: &Value) -> bool {
    match value.get("instructions") {
        Some(Value::Object(instructions)) => INPUT_INSTRUCTION_KEYS
            .iter()
            .any(|key| instructions.contains_key(*key)),
        Some(Value::String(instructions)) => INPUT_INSTRUCTION_KEYS
            .iter()
            .any(|key| instructions.contains(key)),
        _ => false,
    }
}

fn carries_review_payload(value: &Value) -> bool {
    value.get("type").and_then(Value::as_str) == Some("human_review_node")
        || ["outfits", "designs_to_review"]
            .iter()
            .any(|key| value.get(*key).is_some_and(|field| !field.is_null()))
}

fn message_mentions_review(value: &Value) -> bool {
    message_contains_any(value, &REVIEW_KEYWORDS)
}

fn message_mentions_media(value: &Value) -> bool {
    message_contains_any(value, &MEDIA_KEYWORDS)
}

fn message_contains_any(value: &Value, keywords: &[&str]) -> bool {
    let Some(message) = value.get("message").and_then(Value::as_str) else {
        return false;
    };
    let message = message.to_lowercase();
    keywords.iter().any(|keyword| message.contains(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keyword_scan_overrides_structural_input_request() {
        let value = json!({
            "instructions": {"custom_urls": true},
            "message": "please review outfit options",
        });
        assert_eq!(classify(&value), InterruptKind::ReviewOutfit);
    }

    #[test]
    fn service_input_pause_is_user_input() {
        let value = json!({
            "message": "Provide custom URLs, images, and videos for fashion analysis",
            "instructions": {
                "custom_urls": "List of URLs",
                "custom_images": "List of images",
                "custom_videos": "List of videos",
                "query": "Describe the trends"
            }
        });
        assert_eq!(classify(&value), InterruptKind::UserInput);
    }

    #[test]
    fn review_pause_mentioning_video_is_relabelled_user_input() {
        let value = json!({
            "message": "Review outfit designs before proceeding to video generation",
            "total_outfits": 1,
            "outfits": [{"outfit_id": "outfit_0"}],
        });
        assert_eq!(classify(&value), InterruptKind::UserInput);

        let quiet = json!({"message": "Approve the looks", "outfits": []});
        assert_eq!(classify(&quiet), InterruptKind::ReviewOutfit);
    }

    #[test]
    fn structural_review_markers() {
        assert_eq!(
            classify(&json!({"type": "human_review_node"})),
            InterruptKind::ReviewOutfit
        );
        assert_eq!(
            classify(&json!({"designs_to_review": [{"outfit_id": "outfit_0"}]})),
            InterruptKind::ReviewOutfit
        );
        assert_eq!(
            classify(&json!({"designs_to_review": null, "outfits": null})),
            InterruptKind::Generic
        );
        assert_eq!(
            classify(&json!({"instructions": "set the query field"})),
            InterruptKind::UserInput
        );
    }

    #[test]
    fn unmatched_values_are_generic() {
        assert_eq!(classify(&json!({"message": "Confirm budget"})), InterruptKind::Generic);
        assert_eq!(classify(&json!("plain string")), InterruptKind::Generic);
        assert_eq!(classify(&Value::Null), InterruptKind::Generic);
    }

    #[test]
    fn classification_depends_on_value_only() {
        let value = json!({"message": "critique these", "outfits": [1]});
        let first = Interrupt::from_descriptor(&json!({"value": value.clone(), "id": "a"}));
        let second = Interrupt::from_descriptor(&json!({"value": value, "id": "b"}));
        assert_eq!(first.kind, second.kind);
        assert_eq!(first.id.as_deref(), Some("a"));
    }

    #[test]
    fn detect_reads_first_listed_descriptor() {
        let event = StreamEvent::new(json!({
            "__interrupt__": [
                {"value": {"type": "human_review_node"}, "id": "int-1"},
                {"value": {"message": "other"}, "id": "int-2"}
            ]
        }));
        let interrupt = detect(&event).expect("interrupt");
        assert_eq!(interrupt.kind, InterruptKind::ReviewOutfit);
        assert_eq!(interrupt.id.as_deref(), Some("int-1"));
        assert!(detect(&StreamEvent::new(json!({"__interrupt__": []}))).is_none());
    }

    #[test]
    fn manual_stop_has_no_id() {
        let interrupt = Interrupt::manual_stop(json!({"query": "q"}), "outfit_designer");
        assert_eq!(interrupt.kind, InterruptKind::ManualStop);
        assert!(interrupt.id.is_none());
        assert_eq!(interrupt.resume_from.as_deref(), Some("outfit_designer"));
    }
}
