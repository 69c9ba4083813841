use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::ReviewConfig;

use super::domain::{CertifierAssessment, Criterion, CriterionId, Decision};

/// Raw decision form as posted by the certifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewForm {
    #[serde(default)]
    pub csrf_token: Option<String>,
    #[serde(default)]
    pub decision: Option<String>,
    #[serde(default)]
    pub decision_notes: Option<String>,
    #[serde(default)]
    pub criteria_review: BTreeMap<CriterionId, String>,
}

/// A decision that passed every precondition and may be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedReview {
    pub decision: Decision,
    pub notes: String,
    pub assessments: BTreeMap<CriterionId, CertifierAssessment>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewPolicy {
    /// Reject decisions that leave any criterion of the standard unassessed.
    pub require_complete_assessment: bool,
}

impl From<ReviewConfig> for ReviewPolicy {
    fn from(config: ReviewConfig) -> Self {
        Self {
            require_complete_assessment: config.require_complete_assessment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Field-scoped validation failures, in form order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("review submission has {} invalid field(s)", .errors.len())]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|error| error.field == field)
    }

    fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }
}

fn assessment_field(id: CriterionId) -> String {
    format!("criteria_review[{id}]")
}

/// Check a decision form without touching storage.
///
/// A failed anti-forgery check short-circuits so nothing else about the
/// submission is reported back.
pub fn validate_review(
    form: &ReviewForm,
    csrf_verified: bool,
    criteria: &[Criterion],
    policy: ReviewPolicy,
) -> Result<ValidatedReview, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    if !csrf_verified {
        errors.push("csrf_token", "Invalid security token.");
        return Err(errors);
    }

    let decision = form
        .decision
        .as_deref()
        .and_then(|raw| raw.trim().parse::<Decision>().ok());
    if decision.is_none() {
        errors.push("decision", "Please select a decision.");
    }

    let notes = form
        .decision_notes
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    if notes.is_empty() {
        errors.push("decision_notes", "Please provide review notes.");
    }

    let known: BTreeSet<CriterionId> = criteria.iter().map(|criterion| criterion.id).collect();
    let mut assessments = BTreeMap::new();
    for (id, raw) in &form.criteria_review {
        if !known.contains(id) {
            errors.push(
                assessment_field(*id),
                "Assessment refers to a criterion outside this standard.",
            );
            continue;
        }
        match raw.trim().parse::<CertifierAssessment>() {
            Ok(assessment) => {
                assessments.insert(*id, assessment);
            }
            Err(_) => errors.push(assessment_field(*id), "Please select a valid assessment."),
        }
    }

    if policy.require_complete_assessment {
        for criterion in criteria {
            if !form.criteria_review.contains_key(&criterion.id) {
                errors.push(
                    assessment_field(criterion.id),
                    format!("Please assess \"{}\".", criterion.name),
                );
            }
        }
    }

    match decision {
        Some(decision) if errors.is_empty() => Ok(ValidatedReview {
            decision,
            notes,
            assessments,
        }),
        _ => Err(errors),
    }
}
