use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::workflows::certification::domain::{
    Application, ApplicationData, ApplicationId, ApplicationStatus, CertifierAssessment,
    CompanyData, Criterion, CriterionId, Decision, Discussion, Document, Party,
    ReviewHistoryEntry, StandardId, StandardSummary, UserId,
};
use crate::workflows::certification::lifecycle::{check_transition, TransitionCheck};
use crate::workflows::certification::repository::{
    ApplicationRecord, ApplicationRepository, CriteriaStore, DecisionCommit, DecisionReceipt,
    DocumentStore, RepositoryError, ReviewLedger,
};

const APPLICATION_SELECT: &str = r#"
SELECT a.id, a.application_number, a.standard_id, a.applicant_id, a.certifier_id, a.status,
       a.application_data::text AS application_data, a.company_data::text AS company_data,
       a.created_at, a.updated_at, a.submitted_at, a.reviewed_at, a.approved_at,
       a.rejected_at, a.issued_at, a.decision_notes, a.reviewer_id,
       s.name AS standard_name, s.type AS standard_type, s.validity_months,
       ua.company_name AS applicant_company, ua.contact_person AS applicant_contact,
       ua.email AS applicant_email, ua.phone AS applicant_phone,
       uc.company_name AS certifier_company, uc.contact_person AS certifier_contact,
       uc.email AS certifier_email, uc.phone AS certifier_phone
FROM applications a
JOIN standards s ON a.standard_id = s.id
JOIN users ua ON a.applicant_id = ua.id
JOIN users uc ON a.certifier_id = uc.id
"#;

/// PostgreSQL-backed store. Decisions run in a single transaction that
/// locks the application row before re-checking its status.
#[derive(Debug, Clone)]
pub struct PgCertificationStore {
    pool: PgPool,
}

impl PgCertificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => RepositoryError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
            other => RepositoryError::Unavailable(other.to_string()),
        }
    }
}

fn corrupt(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Corrupt(error.to_string())
}

#[derive(sqlx::FromRow)]
struct ApplicationRow {
    id: i64,
    application_number: String,
    standard_id: i64,
    applicant_id: i64,
    certifier_id: i64,
    status: String,
    application_data: Option<String>,
    company_data: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    reviewed_at: Option<DateTime<Utc>>,
    approved_at: Option<DateTime<Utc>>,
    rejected_at: Option<DateTime<Utc>>,
    issued_at: Option<DateTime<Utc>>,
    decision_notes: Option<String>,
    reviewer_id: Option<i64>,
    standard_name: String,
    standard_type: String,
    validity_months: Option<i32>,
    applicant_company: String,
    applicant_contact: String,
    applicant_email: String,
    applicant_phone: Option<String>,
    certifier_company: String,
    certifier_contact: String,
    certifier_email: String,
    certifier_phone: Option<String>,
}

impl TryFrom<ApplicationRow> for ApplicationRecord {
    type Error = RepositoryError;

    fn try_from(row: ApplicationRow) -> Result<Self, Self::Error> {
        let status: ApplicationStatus = row.status.parse().map_err(corrupt)?;

        Ok(ApplicationRecord {
            application: Application {
                id: ApplicationId(row.id),
                application_number: row.application_number,
                standard_id: StandardId(row.standard_id),
                applicant_id: UserId(row.applicant_id),
                certifier_id: UserId(row.certifier_id),
                status,
                application_data: ApplicationData::parse(row.application_data.as_deref()),
                company_data: CompanyData::parse(row.company_data.as_deref()),
                created_at: row.created_at,
                updated_at: row.updated_at,
                submitted_at: row.submitted_at,
                reviewed_at: row.reviewed_at,
                approved_at: row.approved_at,
                rejected_at: row.rejected_at,
                issued_at: row.issued_at,
                decision_notes: row.decision_notes,
                reviewer_id: row.reviewer_id.map(UserId),
            },
            standard: StandardSummary {
                id: StandardId(row.standard_id),
                name: row.standard_name,
                kind: row.standard_type,
                validity_months: row.validity_months,
            },
            applicant: Party {
                id: UserId(row.applicant_id),
                company_name: row.applicant_company,
                contact_person: row.applicant_contact,
                email: row.applicant_email,
                phone: row.applicant_phone,
            },
            certifier: Party {
                id: UserId(row.certifier_id),
                company_name: row.certifier_company,
                contact_person: row.certifier_contact,
                email: row.certifier_email,
                phone: row.certifier_phone,
            },
        })
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: i64,
    application_id: i64,
    reviewer_id: i64,
    action: String,
    notes: String,
    criteria_reviews: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for ReviewHistoryEntry {
    type Error = RepositoryError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let action: Decision = row.action.parse().map_err(corrupt)?;
        let criteria_reviews: BTreeMap<CriterionId, CertifierAssessment> =
            serde_json::from_str(&row.criteria_reviews).map_err(corrupt)?;

        Ok(ReviewHistoryEntry {
            id: row.id,
            application_id: ApplicationId(row.application_id),
            reviewer_id: UserId(row.reviewer_id),
            action,
            notes: row.notes,
            criteria_reviews,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CriterionRow {
    id: i64,
    standard_id: i64,
    name: String,
    requirements: Option<String>,
    description: Option<String>,
    sort_order: i32,
    risk_assessment_required: bool,
}

impl From<CriterionRow> for Criterion {
    fn from(row: CriterionRow) -> Self {
        Criterion {
            id: CriterionId(row.id),
            standard_id: StandardId(row.standard_id),
            name: row.name,
            requirements: row.requirements,
            description: row.description,
            sort_order: row.sort_order,
            risk_assessment_required: row.risk_assessment_required,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: i64,
    application_id: i64,
    document_name: String,
    document_type: String,
    file_path: String,
    uploaded_at: DateTime<Utc>,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Document {
            id: row.id,
            application_id: ApplicationId(row.application_id),
            name: row.document_name,
            document_type: row.document_type,
            file_path: row.file_path,
            uploaded_at: row.uploaded_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DiscussionRow {
    id: i64,
    application_id: i64,
    user_id: i64,
    author_name: String,
    author_role: String,
    message: String,
    created_at: DateTime<Utc>,
}

impl From<DiscussionRow> for Discussion {
    fn from(row: DiscussionRow) -> Self {
        Discussion {
            id: row.id,
            application_id: ApplicationId(row.application_id),
            user_id: UserId(row.user_id),
            author_name: row.author_name,
            author_role: row.author_role,
            message: row.message,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl ApplicationRepository for PgCertificationStore {
    async fn fetch(&self, id: ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let sql = format!("{APPLICATION_SELECT} WHERE a.id = $1");
        sqlx::query_as::<_, ApplicationRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .map(ApplicationRecord::try_from)
            .transpose()
    }

    async fn fetch_for_review(
        &self,
        id: ApplicationId,
        certifier: UserId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let sql = format!(
            "{APPLICATION_SELECT} WHERE a.id = $1 AND a.certifier_id = $2 \
             AND a.status IN ('submitted', 'under_review')"
        );
        sqlx::query_as::<_, ApplicationRow>(&sql)
            .bind(id.0)
            .bind(certifier.0)
            .fetch_optional(&self.pool)
            .await?
            .map(ApplicationRecord::try_from)
            .transpose()
    }

    async fn begin_review(
        &self,
        id: ApplicationId,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE applications
            SET status = 'under_review', reviewed_at = $2, updated_at = $2
            WHERE id = $1 AND status = 'submitted'
            "#,
        )
        .bind(id.0)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn review_history(
        &self,
        id: ApplicationId,
    ) -> Result<Vec<ReviewHistoryEntry>, RepositoryError> {
        sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, application_id, reviewer_id, action, notes,
                   criteria_reviews::text AS criteria_reviews, created_at
            FROM review_history
            WHERE application_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(ReviewHistoryEntry::try_from)
        .collect()
    }

    async fn discussions(&self, id: ApplicationId) -> Result<Vec<Discussion>, RepositoryError> {
        let rows = sqlx::query_as::<_, DiscussionRow>(
            r#"
            SELECT d.id, d.application_id, d.user_id, u.contact_person AS author_name,
                   u.role AS author_role, d.message, d.created_at
            FROM application_discussions d
            JOIN users u ON d.user_id = u.id
            WHERE d.application_id = $1
            ORDER BY d.created_at DESC, d.id DESC
            "#,
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Discussion::from).collect())
    }
}

#[async_trait]
impl CriteriaStore for PgCertificationStore {
    async fn criteria_for_standard(
        &self,
        standard_id: StandardId,
    ) -> Result<Vec<Criterion>, RepositoryError> {
        let rows = sqlx::query_as::<_, CriterionRow>(
            r#"
            SELECT id, standard_id, name, requirements, description, sort_order,
                   risk_assessment_required
            FROM criteria
            WHERE standard_id = $1
            ORDER BY sort_order ASC, id ASC
            "#,
        )
        .bind(standard_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Criterion::from).collect())
    }
}

#[async_trait]
impl DocumentStore for PgCertificationStore {
    async fn documents_for(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<Document>, RepositoryError> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, application_id, document_name, document_type, file_path, uploaded_at
            FROM application_documents
            WHERE application_id = $1
            ORDER BY uploaded_at DESC, id DESC
            "#,
        )
        .bind(application_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Document::from).collect())
    }
}

#[async_trait]
impl ReviewLedger for PgCertificationStore {
    async fn commit_decision(
        &self,
        commit: DecisionCommit,
    ) -> Result<DecisionReceipt, RepositoryError> {
        // Dropping `tx` on any early return rolls the transaction back.
        let mut tx = self.pool.begin().await?;

        let current: Option<(String,)> = sqlx::query_as(
            "SELECT status FROM applications WHERE id = $1 AND certifier_id = $2 FOR UPDATE",
        )
        .bind(commit.application_id.0)
        .bind(commit.certifier_id.0)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((status,)) = current else {
            return Err(RepositoryError::NotFound);
        };
        let status: ApplicationStatus = status.parse().map_err(corrupt)?;
        let TransitionCheck::Permit { to } =
            check_transition(status, commit.decision.transition())
        else {
            return Err(RepositoryError::NotFound);
        };

        let decided_column = match to {
            ApplicationStatus::Approved => "approved_at",
            _ => "rejected_at",
        };
        let update = format!(
            "UPDATE applications \
             SET status = $1, decision_notes = $2, reviewer_id = $3, \
                 {decided_column} = $4, updated_at = $4 \
             WHERE id = $5"
        );
        sqlx::query(&update)
            .bind(to.label())
            .bind(&commit.notes)
            .bind(commit.certifier_id.0)
            .bind(commit.decided_at)
            .bind(commit.application_id.0)
            .execute(&mut *tx)
            .await?;

        let assessments = serde_json::to_value(&commit.assessments).map_err(corrupt)?;
        let (history_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO review_history
                (application_id, reviewer_id, action, notes, criteria_reviews, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(commit.application_id.0)
        .bind(commit.certifier_id.0)
        .bind(commit.decision.label())
        .bind(&commit.notes)
        .bind(assessments)
        .bind(commit.decided_at)
        .fetch_one(&mut *tx)
        .await?;

        let (notification_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO notifications (user_id, type, title, message, data, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(commit.notification.user_id.0)
        .bind(&commit.notification.kind)
        .bind(&commit.notification.title)
        .bind(&commit.notification.message)
        .bind(&commit.notification.data)
        .bind(commit.decided_at)
        .fetch_one(&mut *tx)
        .await?;

        let (email_job_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO email_logs (to_email, subject, template, data, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&commit.email.to_email)
        .bind(&commit.email.subject)
        .bind(&commit.email.template)
        .bind(&commit.email.data)
        .bind(commit.decided_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(DecisionReceipt {
            history_id,
            notification_id,
            email_job_id,
        })
    }
}
