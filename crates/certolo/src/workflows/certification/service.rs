use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use super::domain::{ApplicationId, ApplicationStatus, Decision, RequestContext, Role};
use super::lifecycle::{
    authorize, available_actions, check_transition, timeline, Access, AccessDenied, Transition,
    TransitionCheck,
};
use super::outbox::{decision_email, decision_notification};
use super::repository::{
    ApplicationRecord, CertificationStore, DecisionCommit, DecisionReceipt, RepositoryError,
};
use super::validation::{validate_review, ReviewForm, ReviewPolicy, ValidationErrors};
use super::views::{pair_responses, ApplicationView, ReviewWorkspace};

/// Service composing the store with the lifecycle rules and decision fan-out.
pub struct CertificationService<S> {
    store: Arc<S>,
    policy: ReviewPolicy,
    site_url: String,
}

/// Reported to the caller after a decision was committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewOutcome {
    pub application_id: ApplicationId,
    pub decision: Decision,
    pub status: ApplicationStatus,
    pub receipt: DecisionReceipt,
}

impl ReviewOutcome {
    pub fn message(&self) -> String {
        format!("Application {} successfully!", self.status.label())
    }
}

impl<S> CertificationService<S>
where
    S: CertificationStore + 'static,
{
    pub fn new(store: Arc<S>, policy: ReviewPolicy, site_url: impl Into<String>) -> Self {
        Self {
            store,
            policy,
            site_url: site_url.into(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Load the review screen, moving a `submitted` application to `under_review`.
    pub async fn open_review(
        &self,
        ctx: &RequestContext,
        application_id: ApplicationId,
    ) -> Result<ReviewWorkspace, CertificationError> {
        let mut record = self.reviewable(ctx, application_id).await?;

        let criteria = self
            .store
            .criteria_for_standard(record.application.standard_id)
            .await?;
        let documents = self.store.documents_for(application_id).await?;

        if let TransitionCheck::Permit { to } =
            check_transition(record.application.status, Transition::BeginReview)
        {
            let now = Utc::now();
            if self.store.begin_review(application_id, now).await? {
                info!(
                    application_id = %application_id,
                    certifier_id = %ctx.user_id,
                    "application moved to under review"
                );
                record.application.status = to;
                record.application.reviewed_at = Some(now);
                record.application.updated_at = now;
            } else {
                // Another request changed the row first; show what is stored now.
                record = self.reviewable(ctx, application_id).await?;
            }
        }

        let criteria = pair_responses(criteria, &record.application.application_data);
        Ok(ReviewWorkspace {
            contact: record.contact_card(),
            record,
            criteria,
            documents,
        })
    }

    /// Validate and commit a certifier's decision together with its audit
    /// entry, applicant notification, and queued email.
    pub async fn submit_review(
        &self,
        ctx: &RequestContext,
        application_id: ApplicationId,
        form: &ReviewForm,
    ) -> Result<ReviewOutcome, CertificationError> {
        let record = self.reviewable(ctx, application_id).await?;
        let criteria = self
            .store
            .criteria_for_standard(record.application.standard_id)
            .await?;

        let review = validate_review(form, ctx.csrf_verified, &criteria, self.policy)?;

        let commit = DecisionCommit {
            application_id,
            certifier_id: ctx.user_id,
            decision: review.decision,
            notification: decision_notification(&record, review.decision),
            email: decision_email(&record, review.decision, &review.notes, &self.site_url),
            notes: review.notes,
            assessments: review.assessments,
            decided_at: Utc::now(),
        };

        match self.store.commit_decision(commit).await {
            Ok(receipt) => {
                let status = review.decision.resulting_status();
                info!(
                    application_id = %application_id,
                    certifier_id = %ctx.user_id,
                    decision = review.decision.label(),
                    history_id = receipt.history_id,
                    "review decision committed"
                );
                Ok(ReviewOutcome {
                    application_id,
                    decision: review.decision,
                    status,
                    receipt,
                })
            }
            Err(RepositoryError::NotFound) => {
                warn!(
                    application_id = %application_id,
                    certifier_id = %ctx.user_id,
                    "application left the reviewable state before the decision committed"
                );
                Err(CertificationError::NotFoundOrForbidden)
            }
            Err(source) => {
                error!(
                    application_id = %application_id,
                    certifier_id = %ctx.user_id,
                    decision = review.decision.label(),
                    error = %source,
                    "review submission rolled back"
                );
                Err(CertificationError::SubmissionFailed)
            }
        }
    }

    /// Application page for its applicant or assigned certifier.
    pub async fn view_application(
        &self,
        ctx: &RequestContext,
        application_id: ApplicationId,
    ) -> Result<ApplicationView, CertificationError> {
        let record = self
            .store
            .fetch(application_id)
            .await?
            .ok_or(CertificationError::NotFound)?;

        if let Err(denied) = authorize(ctx, &record.application, Access::View) {
            warn!(
                application_id = %application_id,
                user_id = %ctx.user_id,
                reason = %denied,
                "application view denied"
            );
            return Err(CertificationError::Forbidden(denied));
        }

        let criteria = self
            .store
            .criteria_for_standard(record.application.standard_id)
            .await?;
        let documents = self.store.documents_for(application_id).await?;
        let discussions = self.store.discussions(application_id).await?;
        let review_history = self.store.review_history(application_id).await?;

        Ok(ApplicationView {
            contact: record.contact_card(),
            criteria: pair_responses(criteria, &record.application.application_data),
            documents,
            discussions,
            review_history,
            timeline: timeline(&record.application),
            actions: available_actions(ctx, &record.application),
            record,
        })
    }

    /// Resolve an application the caller may review. Anything outside the
    /// caller's review queue reads as missing.
    async fn reviewable(
        &self,
        ctx: &RequestContext,
        application_id: ApplicationId,
    ) -> Result<ApplicationRecord, CertificationError> {
        if ctx.role != Role::Certifier {
            warn!(
                application_id = %application_id,
                user_id = %ctx.user_id,
                "non-certifier attempted to review"
            );
            return Err(CertificationError::Forbidden(AccessDenied::NotACertifier));
        }

        let record = self
            .store
            .fetch_for_review(application_id, ctx.user_id)
            .await?
            .ok_or(CertificationError::NotFoundOrForbidden)?;

        authorize(ctx, &record.application, Access::Review)
            .map_err(|_| CertificationError::NotFoundOrForbidden)?;

        Ok(record)
    }
}

/// Error raised by the certification service.
#[derive(Debug, thiserror::Error)]
pub enum CertificationError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    /// Missing, assigned elsewhere, or not in a reviewable status.
    #[error("application not found")]
    NotFoundOrForbidden,
    #[error("application not found")]
    NotFound,
    #[error(transparent)]
    Forbidden(#[from] AccessDenied),
    #[error("Failed to submit review. Please try again.")]
    SubmissionFailed,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
