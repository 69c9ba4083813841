//! Certification application review: lifecycle rules, decision validation,
//! storage seams, and the transactional decision fan-out.

pub mod domain;
pub mod lifecycle;
pub mod outbox;
pub mod repository;
pub mod router;
pub mod service;
pub mod store;
pub mod validation;
pub mod views;

#[cfg(test)]
mod tests;

pub use domain::{
    Application, ApplicationData, ApplicationId, ApplicationStatus, CertifierAssessment,
    CompanyData, ContactCard, Criterion, CriterionId, CriterionResponse, Decision, Discussion,
    Document, EmailJob, MeetsRequirement, Notification, Party, RequestContext,
    ReviewHistoryEntry, Role, StandardId, StandardSummary, UserId,
};
pub use lifecycle::{
    authorize, available_actions, check_transition, Access, AccessDenied, AvailableAction,
    TimelineEvent, Transition, TransitionCheck,
};
pub use repository::{
    ApplicationRecord, ApplicationRepository, CertificationStore, CriteriaStore, DecisionCommit,
    DecisionReceipt, DocumentStore, RepositoryError, ReviewLedger,
};
pub use router::certification_router;
pub use service::{CertificationError, CertificationService, ReviewOutcome};
pub use store::{CommitStep, InMemoryCertificationStore, PgCertificationStore};
pub use validation::{validate_review, FieldError, ReviewForm, ReviewPolicy, ValidationErrors};
pub use views::{ApplicationView, CriterionReview, ReviewWorkspace};
