use certolo::workflows::certification::{
    Application, ApplicationData, ApplicationId, ApplicationStatus, CompanyData, Criterion,
    CriterionId, CriterionResponse, Discussion, Document, InMemoryCertificationStore,
    MeetsRequirement, Party, RepositoryError, StandardId, StandardSummary, UserId,
};
use chrono::{Duration, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) const DEMO_APPLICATION: ApplicationId = ApplicationId(1001);
pub(crate) const DEMO_APPLICANT: i64 = 11;
pub(crate) const DEMO_CERTIFIER: i64 = 42;

const DEMO_STANDARD: StandardId = StandardId(1);

/// In-memory store holding one submitted application (A-1001) assigned to
/// certifier 42, for the demo command and database-less serving.
pub(crate) fn seed_demo_store() -> Result<InMemoryCertificationStore, RepositoryError> {
    let store = InMemoryCertificationStore::new();
    let now = Utc::now();

    store.seed_standard(StandardSummary {
        id: DEMO_STANDARD,
        name: "ISO 9001 Quality Management".to_string(),
        kind: "management_system".to_string(),
        validity_months: Some(36),
    });
    store.seed_party(Party {
        id: UserId(DEMO_APPLICANT),
        company_name: "Acme Ltd".to_string(),
        contact_person: "Dana Whitfield".to_string(),
        email: "dana@acme.test".to_string(),
        phone: Some("+44 20 7946 0011".to_string()),
    });
    store.seed_party(Party {
        id: UserId(DEMO_CERTIFIER),
        company_name: "Certolo Assurance".to_string(),
        contact_person: "Sam Ortega".to_string(),
        email: "sam@certolo.test".to_string(),
        phone: None,
    });

    let criteria = [
        (101, "Quality policy", "Documented and signed quality policy", 1),
        (102, "Document control", "Controlled procedures and records", 2),
        (103, "Internal audit", "Audit programme covering all processes", 3),
    ];
    for (id, name, requirements, sort_order) in criteria {
        store.seed_criterion(Criterion {
            id: CriterionId(id),
            standard_id: DEMO_STANDARD,
            name: name.to_string(),
            requirements: Some(requirements.to_string()),
            description: None,
            sort_order,
            risk_assessment_required: id == 103,
        });
    }

    let mut answers = BTreeMap::new();
    answers.insert(
        CriterionId(101),
        CriterionResponse {
            meets_requirement: MeetsRequirement::Yes,
            notes: "Policy approved by the board in March".to_string(),
        },
    );
    answers.insert(
        CriterionId(103),
        CriterionResponse {
            meets_requirement: MeetsRequirement::Partial,
            notes: "Audit programme started this quarter".to_string(),
        },
    );

    let created_at = now - Duration::days(10);
    let submitted_at = now - Duration::days(3);
    store.seed_application(Application {
        id: DEMO_APPLICATION,
        application_number: "A-1001".to_string(),
        standard_id: DEMO_STANDARD,
        applicant_id: UserId(DEMO_APPLICANT),
        certifier_id: UserId(DEMO_CERTIFIER),
        status: ApplicationStatus::Submitted,
        application_data: ApplicationData { criteria: answers },
        company_data: CompanyData {
            company_name: Some("Acme Ltd".to_string()),
            contact_person: Some("Dana Whitfield".to_string()),
            city: Some("London".to_string()),
            country: Some("United Kingdom".to_string()),
            ..CompanyData::default()
        },
        created_at,
        updated_at: submitted_at,
        submitted_at: Some(submitted_at),
        reviewed_at: None,
        approved_at: None,
        rejected_at: None,
        issued_at: None,
        decision_notes: None,
        reviewer_id: None,
    })?;

    for (id, name, document_type, days_ago) in [
        (1, "Quality manual.pdf", "manual", 9),
        (2, "Internal audit plan.xlsx", "plan", 4),
    ] {
        store.seed_document(Document {
            id,
            application_id: DEMO_APPLICATION,
            name: name.to_string(),
            document_type: document_type.to_string(),
            file_path: format!("uploads/{}/{}", DEMO_APPLICATION, id),
            uploaded_at: now - Duration::days(days_ago),
        });
    }
    store.seed_discussion(Discussion {
        id: 1,
        application_id: DEMO_APPLICATION,
        user_id: UserId(DEMO_APPLICANT),
        author_name: "Dana Whitfield".to_string(),
        author_role: "applicant".to_string(),
        message: "Audit evidence for Q3 will follow next week.".to_string(),
        created_at: now - Duration::days(2),
    });

    Ok(store)
}
