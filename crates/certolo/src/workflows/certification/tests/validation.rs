use super::common::*;
use crate::workflows::certification::domain::{CertifierAssessment, CriterionId, Decision};
use crate::workflows::certification::validation::{validate_review, ReviewForm, ReviewPolicy};

#[test]
fn accepts_complete_form_and_trims_notes() {
    let mut form = review_form("approve", "  Meets all criteria \n");
    form.criteria_review
        .insert(CriterionId(303), "na".to_string());

    let review = validate_review(&form, true, &criteria(), ReviewPolicy::default())
        .expect("form is valid");

    assert_eq!(review.decision, Decision::Approve);
    assert_eq!(review.notes, "Meets all criteria");
    assert_eq!(
        review.assessments.get(&CriterionId(303)),
        Some(&CertifierAssessment::Na)
    );
    assert_eq!(review.assessments.len(), 3);
}

#[test]
fn csrf_failure_short_circuits_other_checks() {
    let form = ReviewForm::default();

    let errors = validate_review(&form, false, &criteria(), ReviewPolicy::default())
        .expect_err("forged request rejected");

    assert_eq!(errors.errors.len(), 1);
    assert!(errors.has_field("csrf_token"));
}

#[test]
fn rejects_unknown_decision_and_blank_notes_together() {
    for decision in ["", "approved", "APPROVE", "maybe"] {
        let form = review_form(decision, "   \t");
        let errors = validate_review(&form, true, &criteria(), ReviewPolicy::default())
            .expect_err("invalid form rejected");
        assert!(errors.has_field("decision"), "decision {decision:?}");
        assert!(errors.has_field("decision_notes"));
    }
}

#[test]
fn missing_fields_are_reported() {
    let form = ReviewForm {
        csrf_token: None,
        decision: None,
        decision_notes: None,
        criteria_review: Default::default(),
    };

    let errors = validate_review(&form, true, &criteria(), ReviewPolicy::default())
        .expect_err("empty form rejected");
    let fields: Vec<&str> = errors.errors.iter().map(|e| e.field.as_str()).collect();
    assert_eq!(fields, vec!["decision", "decision_notes"]);
}

#[test]
fn rejects_unknown_assessment_values_and_foreign_criteria() {
    let mut form = review_form("reject", "Missing evidence");
    form.criteria_review
        .insert(CriterionId(302), "excellent".to_string());
    form.criteria_review
        .insert(CriterionId(999), "meets".to_string());

    let errors = validate_review(&form, true, &criteria(), ReviewPolicy::default())
        .expect_err("bad assessments rejected");

    assert!(errors.has_field("criteria_review[302]"));
    assert!(errors.has_field("criteria_review[999]"));
    assert!(!errors.has_field("decision"));
}

#[test]
fn partial_assessment_is_accepted_by_default() {
    let mut form = review_form("approve", "Fine");
    form.criteria_review.clear();

    let review = validate_review(&form, true, &criteria(), ReviewPolicy::default())
        .expect("completeness not enforced by default");
    assert!(review.assessments.is_empty());
}

#[test]
fn completeness_policy_names_each_unassessed_criterion() {
    let form = review_form("approve", "Fine");
    let policy = ReviewPolicy {
        require_complete_assessment: true,
    };

    let errors =
        validate_review(&form, true, &criteria(), policy).expect_err("303 was not assessed");

    assert_eq!(errors.errors.len(), 1);
    assert_eq!(errors.errors[0].field, "criteria_review[303]");
    assert!(errors.errors[0].message.contains("Document control"));
}
