//! Application status state machine and access rules.
//!
//! Every entry point asks this module whether a transition or access is legal
//! instead of repeating status membership checks locally.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{Application, ApplicationStatus, Decision, RequestContext, Role};

/// Events that move an application along its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Applicant submits a draft.
    Submit,
    /// Certifier opens the review screen.
    BeginReview,
    Approve,
    Reject,
    /// Certificate issuance after approval.
    Issue,
}

impl Decision {
    pub const fn transition(self) -> Transition {
        match self {
            Decision::Approve => Transition::Approve,
            Decision::Reject => Transition::Reject,
        }
    }
}

/// Result of checking a transition against the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCheck {
    Permit { to: ApplicationStatus },
    /// Already in the target state; nothing to write.
    NoOp,
    Deny(TransitionDenied),
}

impl TransitionCheck {
    pub fn is_permitted(self) -> bool {
        matches!(self, TransitionCheck::Permit { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot apply {transition:?} to an application that is {from}")]
pub struct TransitionDenied {
    pub from: ApplicationStatus,
    pub transition: Transition,
}

pub fn check_transition(from: ApplicationStatus, transition: Transition) -> TransitionCheck {
    use ApplicationStatus::*;

    let to = match (from, transition) {
        (Draft, Transition::Submit) => Submitted,
        (Submitted, Transition::BeginReview) => UnderReview,
        (UnderReview, Transition::BeginReview) => return TransitionCheck::NoOp,
        (Submitted | UnderReview, Transition::Approve) => Approved,
        (Submitted | UnderReview, Transition::Reject) => Rejected,
        (Approved, Transition::Issue) => Issued,
        _ => return TransitionCheck::Deny(TransitionDenied { from, transition }),
    };

    TransitionCheck::Permit { to }
}

/// Kinds of access an entry point requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    View,
    Edit,
    Review,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    #[error("only certifiers can review applications")]
    NotACertifier,
    #[error("application is assigned to another certifier")]
    NotAssignedCertifier,
    #[error("application belongs to another applicant")]
    NotOwner,
    #[error("application is {0} and cannot be reviewed")]
    NotReviewable(ApplicationStatus),
    #[error("only draft applications can be edited")]
    NotEditable(ApplicationStatus),
    #[error("draft applications are visible only to their applicant")]
    DraftIsPrivate,
}

pub fn authorize(
    ctx: &RequestContext,
    application: &Application,
    access: Access,
) -> Result<(), AccessDenied> {
    match access {
        Access::View => match ctx.role {
            Role::Applicant if application.applicant_id != ctx.user_id => {
                Err(AccessDenied::NotOwner)
            }
            Role::Certifier if application.certifier_id != ctx.user_id => {
                Err(AccessDenied::NotAssignedCertifier)
            }
            Role::Certifier if application.status == ApplicationStatus::Draft => {
                Err(AccessDenied::DraftIsPrivate)
            }
            _ => Ok(()),
        },
        Access::Edit => {
            if ctx.role != Role::Applicant || application.applicant_id != ctx.user_id {
                Err(AccessDenied::NotOwner)
            } else if application.status != ApplicationStatus::Draft {
                Err(AccessDenied::NotEditable(application.status))
            } else {
                Ok(())
            }
        }
        Access::Review => {
            if ctx.role != Role::Certifier {
                Err(AccessDenied::NotACertifier)
            } else if application.certifier_id != ctx.user_id {
                Err(AccessDenied::NotAssignedCertifier)
            } else if !application.status.is_reviewable() {
                Err(AccessDenied::NotReviewable(application.status))
            } else {
                Ok(())
            }
        }
    }
}

/// Follow-up actions the view screen offers to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailableAction {
    EditDraft,
    SubmitDraft,
    Review,
    IssueCertificate,
    ViewCertificate,
}

pub fn available_actions(ctx: &RequestContext, application: &Application) -> Vec<AvailableAction> {
    let mut actions = Vec::new();

    if authorize(ctx, application, Access::Edit).is_ok() {
        actions.push(AvailableAction::EditDraft);
        actions.push(AvailableAction::SubmitDraft);
    }
    if authorize(ctx, application, Access::Review).is_ok() {
        actions.push(AvailableAction::Review);
    }
    if ctx.role == Role::Certifier
        && application.certifier_id == ctx.user_id
        && check_transition(application.status, Transition::Issue).is_permitted()
    {
        actions.push(AvailableAction::IssueCertificate);
    }
    if application.status == ApplicationStatus::Issued {
        actions.push(AvailableAction::ViewCertificate);
    }

    actions
}

/// Milestone reached by an application, for the timeline panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEvent {
    pub status: ApplicationStatus,
    pub label: &'static str,
    pub at: DateTime<Utc>,
}

/// Milestones in lifecycle order; statuses never reached are omitted.
pub fn timeline(application: &Application) -> Vec<TimelineEvent> {
    let milestones = [
        (ApplicationStatus::Draft, "Created", Some(application.created_at)),
        (
            ApplicationStatus::Submitted,
            "Submitted",
            application.submitted_at,
        ),
        (
            ApplicationStatus::UnderReview,
            "Under Review",
            application.reviewed_at,
        ),
        (
            ApplicationStatus::Approved,
            "Approved",
            application.approved_at,
        ),
        (
            ApplicationStatus::Rejected,
            "Rejected",
            application.rejected_at,
        ),
        (ApplicationStatus::Issued, "Issued", application.issued_at),
    ];

    milestones
        .into_iter()
        .filter_map(|(status, label, at)| at.map(|at| TimelineEvent { status, label, at }))
        .collect()
}
