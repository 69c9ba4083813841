use std::sync::Arc;

use serde_json::json;

use super::common::*;
use crate::workflows::certification::domain::{
    ApplicationId, ApplicationStatus, CertifierAssessment, CriterionId, Decision,
    MeetsRequirement, RequestContext,
};
use crate::workflows::certification::lifecycle::{AccessDenied, AvailableAction};
use crate::workflows::certification::repository::RepositoryError;
use crate::workflows::certification::{
    CertificationError, CertificationService, CommitStep, ReviewPolicy,
};

fn assert_untouched(store: &crate::workflows::certification::InMemoryCertificationStore) {
    assert!(store.review_history_rows().is_empty());
    assert!(store.notifications().is_empty());
    assert!(store.email_jobs().is_empty());
}

#[tokio::test]
async fn open_review_moves_submitted_to_under_review_once() {
    let (service, store) = build_service(seeded_store());
    let ctx = RequestContext::certifier(CERTIFIER);

    let first = service
        .open_review(&ctx, APPLICATION)
        .await
        .expect("assigned certifier opens review");
    assert_eq!(first.record.application.status, ApplicationStatus::UnderReview);
    let reviewed_at = store
        .application(APPLICATION)
        .and_then(|row| row.reviewed_at)
        .expect("review start recorded");

    for _ in 0..2 {
        let again = service
            .open_review(&ctx, APPLICATION)
            .await
            .expect("re-open while under review");
        assert_eq!(again.record.application.status, ApplicationStatus::UnderReview);
    }

    let row = store.application(APPLICATION).expect("row present");
    assert_eq!(row.status, ApplicationStatus::UnderReview);
    assert_eq!(row.reviewed_at, Some(reviewed_at));
}

#[tokio::test]
async fn open_review_orders_criteria_and_defaults_missing_answers() {
    let (service, _) = build_service(seeded_store());

    let workspace = service
        .open_review(&RequestContext::certifier(CERTIFIER), APPLICATION)
        .await
        .expect("workspace loads");

    let order: Vec<(usize, i64)> = workspace
        .criteria
        .iter()
        .map(|entry| (entry.position, entry.criterion.id.0))
        .collect();
    assert_eq!(order, vec![(1, 302), (2, 303), (3, 301)]);
    assert_eq!(
        workspace.criteria[0].response.meets_requirement,
        MeetsRequirement::Yes
    );
    assert_eq!(
        workspace.criteria[1].response.meets_requirement,
        MeetsRequirement::No
    );
    assert!(workspace.criteria[1].response.notes.is_empty());

    let documents: Vec<&str> = workspace.documents.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(documents, vec!["Audit report", "Quality manual"]);
    assert_eq!(workspace.contact.company_name, "Acme Fabrication");
    assert_eq!(workspace.contact.email, "dana@acme.test");
}

#[tokio::test]
async fn open_review_hides_applications_of_other_certifiers() {
    let (service, store) = build_service(seeded_store());

    let result = service
        .open_review(&RequestContext::certifier(OTHER_CERTIFIER), APPLICATION)
        .await;

    assert!(matches!(result, Err(CertificationError::NotFoundOrForbidden)));
    let row = store.application(APPLICATION).expect("row present");
    assert_eq!(row.status, ApplicationStatus::Submitted);
    assert!(row.reviewed_at.is_none());
}

#[tokio::test]
async fn applicants_cannot_open_the_review_screen() {
    let (service, _) = build_service(seeded_store());

    let result = service
        .open_review(&RequestContext::applicant(APPLICANT), APPLICATION)
        .await;

    assert!(matches!(
        result,
        Err(CertificationError::Forbidden(AccessDenied::NotACertifier))
    ));
}

#[tokio::test]
async fn approve_commits_status_history_notification_and_email() {
    let (service, store) = build_service(seeded_store());
    let ctx = RequestContext::certifier(CERTIFIER);

    let outcome = service
        .submit_review(&ctx, APPLICATION, &review_form("approve", "Meets all criteria"))
        .await
        .expect("decision commits");
    assert_eq!(outcome.status, ApplicationStatus::Approved);
    assert_eq!(outcome.decision, Decision::Approve);
    assert_eq!(outcome.message(), "Application approved successfully!");

    let row = store.application(APPLICATION).expect("row present");
    assert_eq!(row.status, ApplicationStatus::Approved);
    assert!(row.approved_at.is_some());
    assert!(row.rejected_at.is_none());
    assert_eq!(row.reviewer_id.map(|id| id.0), Some(CERTIFIER));
    assert_eq!(row.decision_notes.as_deref(), Some("Meets all criteria"));
    assert_eq!(Some(row.updated_at), row.approved_at);

    let history = store.review_history_rows();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, outcome.receipt.history_id);
    assert_eq!(history[0].application_id, APPLICATION);
    assert_eq!(history[0].action, Decision::Approve);
    assert_eq!(history[0].notes, "Meets all criteria");
    assert_eq!(
        history[0].criteria_reviews.get(&CriterionId(301)),
        Some(&CertifierAssessment::Partial)
    );

    let notifications = store.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].user_id.0, APPLICANT);
    assert_eq!(notifications[0].kind, "application_approved");
    assert_eq!(notifications[0].title, "Application Approved");
    assert_eq!(
        notifications[0].message,
        "Your application for ISO 9001 Quality Management has been approved."
    );
    assert_eq!(notifications[0].data, json!({ "application_id": 1001 }));

    let emails = store.email_jobs();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].to_email, "dana@acme.test");
    assert_eq!(emails[0].template, "application_approved");
    assert_eq!(emails[0].subject, "Application Approved - A-1001");
    assert_eq!(
        emails[0].data,
        json!({
            "applicant_name": "Dana Whitfield",
            "application_number": "A-1001",
            "standard_name": "ISO 9001 Quality Management",
            "decision_notes": "Meets all criteria",
            "view_link": "https://certolo.test/applications/view/1001",
        })
    );
}

#[tokio::test]
async fn reject_is_symmetric_to_approve() {
    let (service, store) = build_service(seeded_store());
    let ctx = RequestContext::certifier(CERTIFIER);
    service
        .open_review(&ctx, APPLICATION)
        .await
        .expect("open review");

    service
        .submit_review(&ctx, APPLICATION, &review_form("reject", "Evidence missing"))
        .await
        .expect("rejection commits");

    let row = store.application(APPLICATION).expect("row present");
    assert_eq!(row.status, ApplicationStatus::Rejected);
    assert!(row.rejected_at.is_some());
    assert!(row.approved_at.is_none());
    assert_eq!(store.review_history_rows()[0].action, Decision::Reject);
    assert_eq!(store.notifications()[0].kind, "application_rejected");
    assert_eq!(store.email_jobs()[0].template, "application_rejected");
}

#[tokio::test]
async fn invalid_forms_write_nothing() {
    let (service, store) = build_service(seeded_store());
    let ctx = RequestContext::certifier(CERTIFIER);

    for form in [
        review_form("escalate", "Needs a second opinion"),
        review_form("approve", "   "),
    ] {
        let result = service.submit_review(&ctx, APPLICATION, &form).await;
        assert!(matches!(result, Err(CertificationError::Validation(_))));
    }

    let forged = service
        .submit_review(
            &ctx.with_csrf(false),
            APPLICATION,
            &review_form("approve", "Meets all criteria"),
        )
        .await;
    match forged {
        Err(CertificationError::Validation(errors)) => assert!(errors.has_field("csrf_token")),
        other => panic!("expected csrf validation error, got {other:?}"),
    }

    assert_eq!(
        store.application(APPLICATION).map(|row| row.status),
        Some(ApplicationStatus::Submitted)
    );
    assert_untouched(&store);
}

#[tokio::test]
async fn decisions_outside_the_review_queue_are_not_found() {
    let store = seeded_store();
    store
        .seed_application(application(1002, ApplicationStatus::Approved))
        .expect("seed approved");
    store
        .seed_application(application(1003, ApplicationStatus::Draft))
        .expect("seed draft");
    let (service, store) = build_service(store);
    let form = review_form("approve", "Looks fine");

    for (ctx, id) in [
        (RequestContext::certifier(OTHER_CERTIFIER), APPLICATION),
        (RequestContext::certifier(CERTIFIER), ApplicationId(1002)),
        (RequestContext::certifier(CERTIFIER), ApplicationId(1003)),
        (RequestContext::certifier(CERTIFIER), ApplicationId(4040)),
    ] {
        let result = service.submit_review(&ctx, id, &form).await;
        assert!(
            matches!(result, Err(CertificationError::NotFoundOrForbidden)),
            "application {id} for user {}",
            ctx.user_id
        );
    }

    assert_eq!(
        store.application(ApplicationId(1002)).map(|row| row.status),
        Some(ApplicationStatus::Approved)
    );
    assert_untouched(&store);
}

#[tokio::test]
async fn second_decision_fails_precondition() {
    let (service, store) = build_service(seeded_store());
    let ctx = RequestContext::certifier(CERTIFIER);

    service
        .submit_review(&ctx, APPLICATION, &review_form("approve", "First"))
        .await
        .expect("first decision commits");
    let second = service
        .submit_review(&ctx, APPLICATION, &review_form("reject", "Second"))
        .await;

    assert!(matches!(second, Err(CertificationError::NotFoundOrForbidden)));
    assert_eq!(store.review_history_rows().len(), 1);
    assert_eq!(
        store.application(APPLICATION).map(|row| row.status),
        Some(ApplicationStatus::Approved)
    );
}

#[tokio::test]
async fn failure_at_any_step_rolls_back_every_write() {
    for step in [
        CommitStep::UpdateApplication,
        CommitStep::AppendHistory,
        CommitStep::CreateNotification,
        CommitStep::QueueEmail,
    ] {
        let (service, store) = build_service(seeded_store());
        let ctx = RequestContext::certifier(CERTIFIER);
        service
            .open_review(&ctx, APPLICATION)
            .await
            .expect("open review");
        store.fail_next_commit_at(step);

        let result = service
            .submit_review(&ctx, APPLICATION, &review_form("approve", "Meets all criteria"))
            .await;

        match result {
            Err(error @ CertificationError::SubmissionFailed) => {
                assert_eq!(
                    error.to_string(),
                    "Failed to submit review. Please try again."
                );
            }
            other => panic!("expected submission failure at {step:?}, got {other:?}"),
        }
        let row = store.application(APPLICATION).expect("row present");
        assert_eq!(row.status, ApplicationStatus::UnderReview, "{step:?}");
        assert!(row.decision_notes.is_none());
        assert_untouched(&store);

        service
            .submit_review(&ctx, APPLICATION, &review_form("approve", "Meets all criteria"))
            .await
            .expect("retry succeeds once the store recovers");
    }
}

#[tokio::test]
async fn completeness_policy_is_enforced_when_enabled() {
    let store = Arc::new(seeded_store());
    let service = CertificationService::new(
        store.clone(),
        ReviewPolicy {
            require_complete_assessment: true,
        },
        SITE_URL,
    );

    let result = service
        .submit_review(
            &RequestContext::certifier(CERTIFIER),
            APPLICATION,
            &review_form("approve", "Meets all criteria"),
        )
        .await;

    match result {
        Err(CertificationError::Validation(errors)) => {
            assert!(errors.has_field("criteria_review[303]"))
        }
        other => panic!("expected incomplete assessment error, got {other:?}"),
    }
    assert!(store.review_history_rows().is_empty());
}

#[tokio::test]
async fn view_application_enforces_party_access() {
    let (service, _) = build_service(seeded_store());

    let view = service
        .view_application(&RequestContext::applicant(APPLICANT), APPLICATION)
        .await
        .expect("owner views application");
    assert_eq!(view.criteria.len(), 3);
    assert!(view.actions.is_empty());
    assert_eq!(view.timeline.len(), 2);

    let stranger = service
        .view_application(&RequestContext::applicant(12), APPLICATION)
        .await;
    assert!(matches!(
        stranger,
        Err(CertificationError::Forbidden(AccessDenied::NotOwner))
    ));

    let other_certifier = service
        .view_application(&RequestContext::certifier(OTHER_CERTIFIER), APPLICATION)
        .await;
    assert!(matches!(
        other_certifier,
        Err(CertificationError::Forbidden(
            AccessDenied::NotAssignedCertifier
        ))
    ));

    let missing = service
        .view_application(&RequestContext::applicant(APPLICANT), ApplicationId(5))
        .await;
    assert!(matches!(missing, Err(CertificationError::NotFound)));
}

#[tokio::test]
async fn view_application_includes_decision_history() {
    let (service, _) = build_service(seeded_store());
    let certifier = RequestContext::certifier(CERTIFIER);

    let before = service
        .view_application(&certifier, APPLICATION)
        .await
        .expect("certifier views");
    assert_eq!(before.actions, vec![AvailableAction::Review]);

    service
        .submit_review(&certifier, APPLICATION, &review_form("approve", "Good"))
        .await
        .expect("decision commits");

    let after = service
        .view_application(&certifier, APPLICATION)
        .await
        .expect("certifier views");
    assert_eq!(after.review_history.len(), 1);
    assert_eq!(after.actions, vec![AvailableAction::IssueCertificate]);
    assert_eq!(
        after.timeline.last().map(|event| event.status),
        Some(ApplicationStatus::Approved)
    );
}

#[tokio::test]
async fn drafts_stay_private_to_their_applicant() {
    let store = seeded_store();
    store
        .seed_application(application(1004, ApplicationStatus::Draft))
        .expect("seed draft");
    let (service, _) = build_service(store);

    let owner = service
        .view_application(&RequestContext::applicant(APPLICANT), ApplicationId(1004))
        .await
        .expect("owner views own draft");
    assert_eq!(
        owner.actions,
        vec![AvailableAction::EditDraft, AvailableAction::SubmitDraft]
    );

    let certifier = service
        .view_application(&RequestContext::certifier(CERTIFIER), ApplicationId(1004))
        .await;
    assert!(matches!(
        certifier,
        Err(CertificationError::Forbidden(AccessDenied::DraftIsPrivate))
    ));
}

#[tokio::test]
async fn store_outages_surface_as_repository_errors() {
    let service = CertificationService::new(
        Arc::new(UnavailableStore),
        ReviewPolicy::default(),
        SITE_URL,
    );

    let result = service
        .open_review(&RequestContext::certifier(CERTIFIER), APPLICATION)
        .await;

    assert!(matches!(
        result,
        Err(CertificationError::Repository(RepositoryError::Unavailable(_)))
    ));
}
