//! Operator decisions and the resume payloads built from them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ClientError;
use crate::interrupt::InterruptKind;

/// Custom inputs requested by a `user_input` pause.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserInput {
    pub custom_urls: Vec<String>,
    pub custom_images: Vec<String>,
    pub custom_videos: Vec<String>,
    pub query: String,
}

/// Verdict on a `review_outfit` pause, serialized with a `decision_type` tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision_type", rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Edit {
        edit_instructions: String,
    },
    Reject {
        rejection_feedback: String,
        #[serde(default)]
        selected_outfit_ids: Vec<String>,
    },
}

/// What the operator answers a pause with.
#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    Review(ReviewDecision),
    UserInput(UserInput),
    /// Edited copy of the interrupt value (generic pauses) or of the state
    /// values (manual stops).
    Edited(Value),
}

impl Decision {
    pub fn approve() -> Self {
        Decision::Review(ReviewDecision::Approve)
    }

    pub fn edit(edit_instructions: impl Into<String>) -> Self {
        Decision::Review(ReviewDecision::Edit {
            edit_instructions: edit_instructions.into(),
        })
    }

    pub fn reject(rejection_feedback: impl Into<String>, selected_outfit_ids: Vec<String>) -> Self {
        Decision::Review(ReviewDecision::Reject {
            rejection_feedback: rejection_feedback.into(),
            selected_outfit_ids,
        })
    }

    fn label(&self) -> &'static str {
        match self {
            Decision::Review(_) => "review decision",
            Decision::UserInput(_) => "user input",
            Decision::Edited(_) => "edited value",
        }
    }
}

/// Validates `decision` against the pause kind and builds the resume payload.
///
/// Review verdicts and user input answer any service pause, whatever its
/// label. Edited values answer generic pauses and manual stops only; manual
/// stops take nothing else.
pub fn build_resume_payload(kind: InterruptKind, decision: &Decision) -> Result<Value, ClientError> {
    match (kind, decision) {
        (InterruptKind::ManualStop, Decision::Edited(value))
        | (InterruptKind::Generic, Decision::Edited(value)) => Ok(value.clone()),
        (InterruptKind::ManualStop, _) | (_, Decision::Edited(_)) => {
            Err(ClientError::Validation(format!(
                "a {} does not answer a {kind} pause",
                decision.label()
            )))
        }
        (_, Decision::Review(review)) => {
            validate_review(review)?;
            to_payload(review)
        }
        (_, Decision::UserInput(input)) => to_payload(input),
    }
}

fn validate_review(review: &ReviewDecision) -> Result<(), ClientError> {
    match review {
        ReviewDecision::Approve => Ok(()),
        ReviewDecision::Edit { edit_instructions } if edit_instructions.trim().is_empty() => Err(
            ClientError::Validation("edit instructions are required when editing".into()),
        ),
        ReviewDecision::Reject {
            rejection_feedback, ..
        } if rejection_feedback.trim().is_empty() => Err(ClientError::Validation(
            "rejection feedback is required when rejecting".into(),
        )),
        _ => Ok(()),
    }
}

fn to_payload(value: &impl Serialize) -> Result<Value, ClientError> {
    serde_json::to_value(value)
        .map_err(|err| ClientError::Validation(format!("failed to encode decision: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn review_payloads_carry_decision_type() {
        assert_eq!(
            build_resume_payload(InterruptKind::ReviewOutfit, &Decision::approve()).expect("ok"),
            json!({"decision_type": "approve"})
        );
        assert_eq!(
            build_resume_payload(InterruptKind::ReviewOutfit, &Decision::edit("warmer palette"))
                .expect("ok"),
            json!({"decision_type": "edit", "edit_instructions": "warmer palette"})
        );
        let reject = Decision::reject("too formal", vec!["outfit_1".into()]);
        assert_eq!(
            build_resume_payload(InterruptKind::ReviewOutfit, &reject).expect("ok"),
            json!({
                "decision_type": "reject",
                "rejection_feedback": "too formal",
                "selected_outfit_ids": ["outfit_1"]
            })
        );
    }

    #[test]
    fn user_input_payload_has_all_fields() {
        let input = UserInput {
            custom_urls: vec!["https://example.com/look".into()],
            query: "spring streetwear".into(),
            ..UserInput::default()
        };
        let payload =
            build_resume_payload(InterruptKind::UserInput, &Decision::UserInput(input)).expect("ok");
        assert_eq!(
            payload,
            json!({
                "custom_urls": ["https://example.com/look"],
                "custom_images": [],
                "custom_videos": [],
                "query": "spring streetwear"
            })
        );
    }

    #[test]
    fn generic_payload_is_the_edited_value() {
        let edited = json!({"budget": 200});
        assert_eq!(
            build_resume_payload(InterruptKind::Generic, &Decision::Edited(edited.clone()))
                .expect("ok"),
            edited
        );
    }

    #[test]
    fn empty_edit_or_reject_text_is_rejected() {
        let err = build_resume_payload(InterruptKind::ReviewOutfit, &Decision::edit("  "))
            .expect_err("empty edit");
        assert!(err.is_precondition());
        let err = build_resume_payload(
            InterruptKind::ReviewOutfit,
            &Decision::reject("", Vec::new()),
        )
        .expect_err("empty reject");
        assert!(matches!(err, ClientError::Validation(msg) if msg.contains("rejection feedback")));
    }

    #[test]
    fn mismatched_decision_is_rejected() {
        let err = build_resume_payload(InterruptKind::ManualStop, &Decision::approve())
            .expect_err("manual stop takes values");
        assert!(matches!(err, ClientError::Validation(msg) if msg.contains("manual_stop")));
        assert!(build_resume_payload(
            InterruptKind::ReviewOutfit,
            &Decision::Edited(json!({}))
        )
        .is_err());
        assert!(build_resume_payload(InterruptKind::UserInput, &Decision::Edited(json!({}))).is_err());
    }

    #[test]
    fn review_verdict_answers_pause_labelled_user_input() {
        let value = json!({
            "message": "Review outfit designs before proceeding to video generation",
            "total_outfits": 1,
            "outfits": [{"outfit_id": "outfit_0"}],
        });
        let kind = crate::interrupt::classify(&value);
        assert_eq!(kind, InterruptKind::UserInput);
        assert_eq!(
            build_resume_payload(kind, &Decision::approve()).expect("approve"),
            json!({"decision_type": "approve"})
        );
        let err = build_resume_payload(kind, &Decision::reject(" ", Vec::new()))
            .expect_err("empty feedback");
        assert!(err.is_precondition());
    }

    #[test]
    fn generic_pause_accepts_any_service_answer() {
        assert!(build_resume_payload(InterruptKind::Generic, &Decision::approve()).is_ok());
        assert!(
            build_resume_payload(InterruptKind::Generic, &Decision::UserInput(UserInput::default()))
                .is_ok()
        );
    }

    #[test]
    fn user_input_deserializes_with_missing_fields() {
        let input: UserInput = serde_json::from_value(json!({"query": "denim"})).expect("parse");
        assert_eq!(input.query, "denim");
        assert!(input.custom_videos.is_empty());
    }
}
