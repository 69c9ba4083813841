use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::certification::domain::{
    Application, ApplicationData, ApplicationId, ApplicationStatus, CompanyData, Criterion,
    CriterionId, CriterionResponse, Discussion, Document, MeetsRequirement, Party,
    ReviewHistoryEntry, StandardId, StandardSummary, UserId,
};
use crate::workflows::certification::repository::{
    ApplicationRecord, ApplicationRepository, CriteriaStore, DecisionCommit, DecisionReceipt,
    DocumentStore, RepositoryError, ReviewLedger,
};
use crate::workflows::certification::{
    certification_router, CertificationService, InMemoryCertificationStore, ReviewForm,
    ReviewPolicy,
};

pub(super) const SITE_URL: &str = "https://certolo.test";
pub(super) const APPLICATION: ApplicationId = ApplicationId(1001);
pub(super) const APPLICANT: i64 = 11;
pub(super) const CERTIFIER: i64 = 42;
pub(super) const OTHER_CERTIFIER: i64 = 99;
pub(super) const STANDARD: StandardId = StandardId(7);

pub(super) fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, day, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn standard() -> StandardSummary {
    StandardSummary {
        id: STANDARD,
        name: "ISO 9001 Quality Management".to_string(),
        kind: "management_system".to_string(),
        validity_months: Some(36),
    }
}

pub(super) fn party(id: i64, company: &str, contact: &str, email: &str) -> Party {
    Party {
        id: UserId(id),
        company_name: company.to_string(),
        contact_person: contact.to_string(),
        email: email.to_string(),
        phone: None,
    }
}

pub(super) fn criterion(id: i64, name: &str, sort_order: i32) -> Criterion {
    Criterion {
        id: CriterionId(id),
        standard_id: STANDARD,
        name: name.to_string(),
        requirements: Some(format!("Evidence for {name}")),
        description: None,
        sort_order,
        risk_assessment_required: id == 301,
    }
}

/// Seeded in display order 302, 303, 301.
pub(super) fn criteria() -> Vec<Criterion> {
    vec![
        criterion(301, "Risk management", 2),
        criterion(303, "Document control", 1),
        criterion(302, "Quality policy", 1),
    ]
}

pub(super) fn application(id: i64, status: ApplicationStatus) -> Application {
    let mut answers = BTreeMap::new();
    answers.insert(
        CriterionId(302),
        CriterionResponse {
            meets_requirement: MeetsRequirement::Yes,
            notes: "Policy signed by the board".to_string(),
        },
    );
    answers.insert(
        CriterionId(301),
        CriterionResponse {
            meets_requirement: MeetsRequirement::Partial,
            notes: String::new(),
        },
    );

    Application {
        id: ApplicationId(id),
        application_number: format!("A-{id}"),
        standard_id: STANDARD,
        applicant_id: UserId(APPLICANT),
        certifier_id: UserId(CERTIFIER),
        status,
        application_data: ApplicationData { criteria: answers },
        company_data: CompanyData {
            company_name: Some("Acme Fabrication".to_string()),
            ..CompanyData::default()
        },
        created_at: at(1, 9),
        updated_at: at(2, 9),
        submitted_at: (status != ApplicationStatus::Draft).then(|| at(2, 9)),
        reviewed_at: None,
        approved_at: None,
        rejected_at: None,
        issued_at: None,
        decision_notes: None,
        reviewer_id: None,
    }
}

pub(super) fn seeded_store() -> InMemoryCertificationStore {
    let store = InMemoryCertificationStore::new();
    store.seed_standard(standard());
    store.seed_party(party(
        APPLICANT,
        "Acme Ltd",
        "Dana Whitfield",
        "dana@acme.test",
    ));
    store.seed_party(party(CERTIFIER, "CertBody", "Sam Ortega", "sam@cert.test"));
    store.seed_party(party(
        OTHER_CERTIFIER,
        "OtherBody",
        "Lee Marsh",
        "lee@other.test",
    ));
    for criterion in criteria() {
        store.seed_criterion(criterion);
    }
    store
        .seed_application(application(APPLICATION.0, ApplicationStatus::Submitted))
        .expect("seed application");
    store.seed_document(Document {
        id: 1,
        application_id: APPLICATION,
        name: "Quality manual".to_string(),
        document_type: "manual".to_string(),
        file_path: "1001/manual.pdf".to_string(),
        uploaded_at: at(1, 10),
    });
    store.seed_document(Document {
        id: 2,
        application_id: APPLICATION,
        name: "Audit report".to_string(),
        document_type: "report".to_string(),
        file_path: "1001/audit.pdf".to_string(),
        uploaded_at: at(2, 8),
    });
    store
}

pub(super) fn build_service(
    store: InMemoryCertificationStore,
) -> (
    CertificationService<InMemoryCertificationStore>,
    Arc<InMemoryCertificationStore>,
) {
    let store = Arc::new(store);
    let service = CertificationService::new(store.clone(), ReviewPolicy::default(), SITE_URL);
    (service, store)
}

pub(super) fn review_form(decision: &str, notes: &str) -> ReviewForm {
    let mut criteria_review = BTreeMap::new();
    criteria_review.insert(CriterionId(302), "meets".to_string());
    criteria_review.insert(CriterionId(301), "partial".to_string());
    ReviewForm {
        csrf_token: Some("token-123".to_string()),
        decision: Some(decision.to_string()),
        decision_notes: Some(notes.to_string()),
        criteria_review,
    }
}

pub(super) fn router_for(store: InMemoryCertificationStore) -> axum::Router {
    let (service, _) = build_service(store);
    certification_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) struct UnavailableStore;

fn offline<T>() -> Result<T, RepositoryError> {
    Err(RepositoryError::Unavailable("database offline".to_string()))
}

#[async_trait]
impl ApplicationRepository for UnavailableStore {
    async fn fetch(&self, _id: ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        offline()
    }

    async fn fetch_for_review(
        &self,
        _id: ApplicationId,
        _certifier: UserId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        offline()
    }

    async fn begin_review(
        &self,
        _id: ApplicationId,
        _at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        offline()
    }

    async fn review_history(
        &self,
        _id: ApplicationId,
    ) -> Result<Vec<ReviewHistoryEntry>, RepositoryError> {
        offline()
    }

    async fn discussions(&self, _id: ApplicationId) -> Result<Vec<Discussion>, RepositoryError> {
        offline()
    }
}

#[async_trait]
impl CriteriaStore for UnavailableStore {
    async fn criteria_for_standard(
        &self,
        _standard_id: StandardId,
    ) -> Result<Vec<Criterion>, RepositoryError> {
        offline()
    }
}

#[async_trait]
impl DocumentStore for UnavailableStore {
    async fn documents_for(
        &self,
        _application_id: ApplicationId,
    ) -> Result<Vec<Document>, RepositoryError> {
        offline()
    }
}

#[async_trait]
impl ReviewLedger for UnavailableStore {
    async fn commit_decision(
        &self,
        _commit: DecisionCommit,
    ) -> Result<DecisionReceipt, RepositoryError> {
        offline()
    }
}
