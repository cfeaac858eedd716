//! The answer surface: closed label set, grounded citations.

use serde::{Deserialize, Serialize};

use crate::error::RagError;

/// The closed label vocabulary. Anything else from a generator is a
/// contract violation, never passed through to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerLabel {
    LicenseRequired,
    NoLicenseRequired,
    Permitted,
    PermittedWithLicense,
    Prohibited,
    Unanswerable,
}

impl AnswerLabel {
    pub fn parse(s: &str) -> Result<Self, RagError> {
        match s.trim() {
            "license_required" => Ok(Self::LicenseRequired),
            "no_license_required" => Ok(Self::NoLicenseRequired),
            "permitted" => Ok(Self::Permitted),
            "permitted_with_license" => Ok(Self::PermittedWithLicense),
            "prohibited" => Ok(Self::Prohibited),
            "unanswerable" => Ok(Self::Unanswerable),
            other => Err(RagError::ContractViolation(format!(
                "label {other:?} outside the closed set"
            ))),
        }
    }
}

/// A grounded citation: a canonical section id (never an anchored child id)
/// plus the retrieval score that put it in context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub section_id: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagAnswer {
    pub label: AnswerLabel,
    pub answer: String,
    pub citations: Vec<Citation>,
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refusal_reason: Option<String>,
    pub grounded: bool,
}

impl RagAnswer {
    /// The mandatory refusal shape: unanswerable, no citations, ungrounded.
    pub fn refusal(reason: &str, rationale: String) -> Self {
        Self {
            label: AnswerLabel::Unanswerable,
            answer: String::new(),
            citations: Vec::new(),
            rationale,
            refusal_reason: Some(reason.to_string()),
            grounded: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_labels_parse_round_trip() {
        for s in [
            "license_required",
            "no_license_required",
            "permitted",
            "permitted_with_license",
            "prohibited",
            "unanswerable",
        ] {
            let label = AnswerLabel::parse(s).unwrap();
            assert_eq!(serde_json::to_string(&label).unwrap(), format!("\"{s}\""));
        }
    }

    #[test]
    fn unknown_label_is_contract_violation() {
        assert!(matches!(
            AnswerLabel::parse("maybe_allowed").unwrap_err(),
            RagError::ContractViolation(_)
        ));
    }

    #[test]
    fn refusal_shape_holds() {
        let r = RagAnswer::refusal("thin_retrieval", "0 docs retrieved".into());
        assert_eq!(r.label, AnswerLabel::Unanswerable);
        assert!(r.citations.is_empty());
        assert!(!r.grounded);
        assert_eq!(r.refusal_reason.as_deref(), Some("thin_retrieval"));
    }
}
