use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Application, ApplicationId, CertifierAssessment, ContactCard, Criterion, CriterionId,
    Decision, Discussion, Document, Party, ReviewHistoryEntry, StandardId, StandardSummary,
    UserId,
};

/// Application row joined with its standard and both parties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub application: Application,
    pub standard: StandardSummary,
    pub applicant: Party,
    pub certifier: Party,
}

impl ApplicationRecord {
    /// Applicant contact as submitted, falling back to the account profile.
    pub fn contact_card(&self) -> ContactCard {
        let company = &self.application.company_data;
        ContactCard {
            company_name: company
                .company_name
                .clone()
                .unwrap_or_else(|| self.applicant.company_name.clone()),
            contact_person: company
                .contact_person
                .clone()
                .unwrap_or_else(|| self.applicant.contact_person.clone()),
            email: company
                .email
                .clone()
                .unwrap_or_else(|| self.applicant.email.clone()),
            phone: company.phone.clone().or_else(|| self.applicant.phone.clone()),
        }
    }
}

/// Notification to be inserted alongside a decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewNotification {
    pub user_id: UserId,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
}

/// Email job to be queued alongside a decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewEmailJob {
    pub to_email: String,
    pub subject: String,
    pub template: String,
    pub data: serde_json::Value,
}

/// Everything a decision writes, applied as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionCommit {
    pub application_id: ApplicationId,
    pub certifier_id: UserId,
    pub decision: Decision,
    pub notes: String,
    pub assessments: BTreeMap<CriterionId, CertifierAssessment>,
    pub decided_at: DateTime<Utc>,
    pub notification: NewNotification,
    pub email: NewEmailJob,
}

/// Identifiers of the rows a committed decision produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DecisionReceipt {
    pub history_id: i64,
    pub notification_id: i64,
    pub email_job_id: i64,
}

#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    async fn fetch(&self, id: ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError>;

    /// Only matches applications assigned to `certifier` that are still reviewable.
    async fn fetch_for_review(
        &self,
        id: ApplicationId,
        certifier: UserId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError>;

    /// Move `submitted` to `under_review`. Returns false when the row was not `submitted`.
    async fn begin_review(
        &self,
        id: ApplicationId,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Decisions recorded for an application, newest first.
    async fn review_history(
        &self,
        id: ApplicationId,
    ) -> Result<Vec<ReviewHistoryEntry>, RepositoryError>;

    /// Discussion entries, newest first.
    async fn discussions(&self, id: ApplicationId) -> Result<Vec<Discussion>, RepositoryError>;
}

#[async_trait]
pub trait CriteriaStore: Send + Sync {
    /// Criteria ordered by `sort_order`, then id.
    async fn criteria_for_standard(
        &self,
        standard_id: StandardId,
    ) -> Result<Vec<Criterion>, RepositoryError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Uploaded documents, newest first.
    async fn documents_for(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<Document>, RepositoryError>;
}

#[async_trait]
pub trait ReviewLedger: Send + Sync {
    /// Apply status change, history, notification and email job atomically.
    ///
    /// The reviewable-status and assignment precondition is re-checked inside
    /// the unit of work; a lost race yields [`RepositoryError::NotFound`].
    async fn commit_decision(
        &self,
        commit: DecisionCommit,
    ) -> Result<DecisionReceipt, RepositoryError>;
}

/// Everything the certification service needs from storage.
pub trait CertificationStore:
    ApplicationRepository + CriteriaStore + DocumentStore + ReviewLedger
{
}

impl<T> CertificationStore for T where
    T: ApplicationRepository + CriteriaStore + DocumentStore + ReviewLedger
{
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
}
