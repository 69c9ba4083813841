use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::workflows::certification::domain::{
    Application, ApplicationId, ApplicationStatus, Criterion, Discussion, Document, EmailJob,
    Notification, Party, ReviewHistoryEntry, StandardId, StandardSummary, UserId,
};
use crate::workflows::certification::lifecycle::{check_transition, Transition, TransitionCheck};
use crate::workflows::certification::repository::{
    ApplicationRecord, ApplicationRepository, CriteriaStore, DecisionCommit, DecisionReceipt,
    DocumentStore, RepositoryError, ReviewLedger,
};

/// The writes a decision performs, in order. Used to inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStep {
    UpdateApplication,
    AppendHistory,
    CreateNotification,
    QueueEmail,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    standards: BTreeMap<StandardId, StandardSummary>,
    users: BTreeMap<UserId, Party>,
    applications: BTreeMap<ApplicationId, Application>,
    criteria: Vec<Criterion>,
    documents: Vec<Document>,
    discussions: Vec<Discussion>,
    review_history: Vec<ReviewHistoryEntry>,
    notifications: Vec<Notification>,
    email_jobs: Vec<EmailJob>,
    sequence: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.sequence += 1;
        self.sequence
    }

    fn record(&self, application: &Application) -> Result<ApplicationRecord, RepositoryError> {
        let standard = self
            .standards
            .get(&application.standard_id)
            .cloned()
            .ok_or_else(|| {
                RepositoryError::Corrupt(format!(
                    "application {} references missing standard {}",
                    application.id, application.standard_id
                ))
            })?;
        let party = |id: UserId| {
            self.users.get(&id).cloned().ok_or_else(|| {
                RepositoryError::Corrupt(format!(
                    "application {} references missing user {}",
                    application.id, id
                ))
            })
        };

        Ok(ApplicationRecord {
            application: application.clone(),
            standard,
            applicant: party(application.applicant_id)?,
            certifier: party(application.certifier_id)?,
        })
    }
}

/// Process-local store. All tables sit behind one lock, so each call is
/// serialized and a decision is applied to a staged copy that only replaces
/// the live tables once every write succeeded.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCertificationStore {
    tables: Arc<Mutex<Tables>>,
    fail_at: Arc<Mutex<Option<CommitStep>>>,
}

impl InMemoryCertificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next decision commit fail when it reaches `step`.
    pub fn fail_next_commit_at(&self, step: CommitStep) {
        *self.fail_at.lock().unwrap_or_else(PoisonError::into_inner) = Some(step);
    }

    fn take_fault(&self) -> Option<CommitStep> {
        self.fail_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn seed_standard(&self, standard: StandardSummary) {
        self.lock().standards.insert(standard.id, standard);
    }

    pub fn seed_party(&self, party: Party) {
        self.lock().users.insert(party.id, party);
    }

    pub fn seed_application(&self, application: Application) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        if tables.applications.contains_key(&application.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.applications.insert(application.id, application);
        Ok(())
    }

    pub fn seed_criterion(&self, criterion: Criterion) {
        self.lock().criteria.push(criterion);
    }

    pub fn seed_document(&self, document: Document) {
        self.lock().documents.push(document);
    }

    pub fn seed_discussion(&self, discussion: Discussion) {
        self.lock().discussions.push(discussion);
    }

    /// Raw application row, bypassing joins.
    pub fn application(&self, id: ApplicationId) -> Option<Application> {
        self.lock().applications.get(&id).cloned()
    }

    pub fn review_history_rows(&self) -> Vec<ReviewHistoryEntry> {
        self.lock().review_history.clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().notifications.clone()
    }

    pub fn email_jobs(&self) -> Vec<EmailJob> {
        self.lock().email_jobs.clone()
    }
}

fn newest_first<T, F>(mut rows: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> (DateTime<Utc>, i64),
{
    rows.sort_by_key(|row| std::cmp::Reverse(key(row)));
    rows
}

#[async_trait]
impl ApplicationRepository for InMemoryCertificationStore {
    async fn fetch(&self, id: ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let tables = self.lock();
        tables
            .applications
            .get(&id)
            .map(|application| tables.record(application))
            .transpose()
    }

    async fn fetch_for_review(
        &self,
        id: ApplicationId,
        certifier: UserId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let tables = self.lock();
        tables
            .applications
            .get(&id)
            .filter(|application| {
                application.certifier_id == certifier && application.status.is_reviewable()
            })
            .map(|application| tables.record(application))
            .transpose()
    }

    async fn begin_review(
        &self,
        id: ApplicationId,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.lock();
        let application = tables
            .applications
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;

        match check_transition(application.status, Transition::BeginReview) {
            TransitionCheck::Permit { to } => {
                application.status = to;
                application.reviewed_at = Some(at);
                application.updated_at = at;
                Ok(true)
            }
            TransitionCheck::NoOp | TransitionCheck::Deny(_) => Ok(false),
        }
    }

    async fn review_history(
        &self,
        id: ApplicationId,
    ) -> Result<Vec<ReviewHistoryEntry>, RepositoryError> {
        let rows = self
            .lock()
            .review_history
            .iter()
            .filter(|entry| entry.application_id == id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |entry: &ReviewHistoryEntry| {
            (entry.created_at, entry.id)
        }))
    }

    async fn discussions(&self, id: ApplicationId) -> Result<Vec<Discussion>, RepositoryError> {
        let rows = self
            .lock()
            .discussions
            .iter()
            .filter(|entry| entry.application_id == id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |entry: &Discussion| {
            (entry.created_at, entry.id)
        }))
    }
}

#[async_trait]
impl CriteriaStore for InMemoryCertificationStore {
    async fn criteria_for_standard(
        &self,
        standard_id: StandardId,
    ) -> Result<Vec<Criterion>, RepositoryError> {
        let mut criteria: Vec<Criterion> = self
            .lock()
            .criteria
            .iter()
            .filter(|criterion| criterion.standard_id == standard_id)
            .cloned()
            .collect();
        criteria.sort_by_key(|criterion| (criterion.sort_order, criterion.id));
        Ok(criteria)
    }
}

#[async_trait]
impl DocumentStore for InMemoryCertificationStore {
    async fn documents_for(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<Document>, RepositoryError> {
        let rows = self
            .lock()
            .documents
            .iter()
            .filter(|document| document.application_id == application_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |document: &Document| {
            (document.uploaded_at, document.id)
        }))
    }
}

#[async_trait]
impl ReviewLedger for InMemoryCertificationStore {
    async fn commit_decision(
        &self,
        commit: DecisionCommit,
    ) -> Result<DecisionReceipt, RepositoryError> {
        let fault = self.take_fault();
        let injected = |step: CommitStep| -> Result<(), RepositoryError> {
            if fault == Some(step) {
                Err(RepositoryError::Unavailable(format!(
                    "injected failure at {step:?}"
                )))
            } else {
                Ok(())
            }
        };

        let mut live = self.lock();
        let mut staged = live.clone();

        injected(CommitStep::UpdateApplication)?;
        let application = staged
            .applications
            .get_mut(&commit.application_id)
            .filter(|application| application.certifier_id == commit.certifier_id)
            .ok_or(RepositoryError::NotFound)?;
        let TransitionCheck::Permit { to } =
            check_transition(application.status, commit.decision.transition())
        else {
            return Err(RepositoryError::NotFound);
        };
        application.status = to;
        match to {
            ApplicationStatus::Approved => application.approved_at = Some(commit.decided_at),
            _ => application.rejected_at = Some(commit.decided_at),
        }
        application.reviewer_id = Some(commit.certifier_id);
        application.decision_notes = Some(commit.notes.clone());
        application.updated_at = commit.decided_at;

        injected(CommitStep::AppendHistory)?;
        let history_id = staged.next_id();
        staged.review_history.push(ReviewHistoryEntry {
            id: history_id,
            application_id: commit.application_id,
            reviewer_id: commit.certifier_id,
            action: commit.decision,
            notes: commit.notes.clone(),
            criteria_reviews: commit.assessments.clone(),
            created_at: commit.decided_at,
        });

        injected(CommitStep::CreateNotification)?;
        let notification_id = staged.next_id();
        staged.notifications.push(Notification {
            id: notification_id,
            user_id: commit.notification.user_id,
            kind: commit.notification.kind,
            title: commit.notification.title,
            message: commit.notification.message,
            data: commit.notification.data,
            created_at: commit.decided_at,
        });

        injected(CommitStep::QueueEmail)?;
        let email_job_id = staged.next_id();
        staged.email_jobs.push(EmailJob {
            id: email_job_id,
            to_email: commit.email.to_email,
            subject: commit.email.subject,
            template: commit.email.template,
            data: commit.email.data,
            created_at: commit.decided_at,
        });

        *live = staged;
        Ok(DecisionReceipt {
            history_id,
            notification_id,
            email_job_id,
        })
    }
}
