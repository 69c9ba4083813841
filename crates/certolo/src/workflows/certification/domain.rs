use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Primary key of an application row.
    ApplicationId
);
numeric_id!(
    /// Applicant or certifier account.
    UserId
);
numeric_id!(StandardId);
numeric_id!(CriterionId);

/// Role of the authenticated caller, supplied by the identity layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Applicant,
    Certifier,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Applicant => "applicant",
            Role::Certifier => "certifier",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "applicant" => Ok(Role::Applicant),
            "certifier" => Ok(Role::Certifier),
            other => Err(UnknownValue::new("role", other)),
        }
    }
}

/// Per-request identity passed explicitly into every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: UserId,
    pub role: Role,
    /// Whether the submission carried a valid anti-forgery token.
    pub csrf_verified: bool,
}

impl RequestContext {
    pub fn certifier(user_id: i64) -> Self {
        Self {
            user_id: UserId(user_id),
            role: Role::Certifier,
            csrf_verified: true,
        }
    }

    pub fn applicant(user_id: i64) -> Self {
        Self {
            user_id: UserId(user_id),
            role: Role::Applicant,
            csrf_verified: true,
        }
    }

    pub fn with_csrf(mut self, verified: bool) -> Self {
        self.csrf_verified = verified;
        self
    }
}

/// Raised when a stored or submitted label does not map to a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownValue {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Lifecycle status of a certification application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    Submitted,
    UnderReview,
    Approved,
    Rejected,
    Issued,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "draft",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::UnderReview => "under_review",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Issued => "issued",
        }
    }

    /// Human readable form shown in badges and notification titles.
    pub const fn title(self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "Draft",
            ApplicationStatus::Submitted => "Submitted",
            ApplicationStatus::UnderReview => "Under Review",
            ApplicationStatus::Approved => "Approved",
            ApplicationStatus::Rejected => "Rejected",
            ApplicationStatus::Issued => "Issued",
        }
    }

    /// Statuses a certifier may open for review.
    pub const fn is_reviewable(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Submitted | ApplicationStatus::UnderReview
        )
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ApplicationStatus {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "draft" => Ok(ApplicationStatus::Draft),
            "submitted" => Ok(ApplicationStatus::Submitted),
            "under_review" => Ok(ApplicationStatus::UnderReview),
            "approved" => Ok(ApplicationStatus::Approved),
            "rejected" => Ok(ApplicationStatus::Rejected),
            "issued" => Ok(ApplicationStatus::Issued),
            other => Err(UnknownValue::new("application status", other)),
        }
    }
}

/// Applicant self-assessment against a single criterion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetsRequirement {
    Yes,
    Partial,
    #[default]
    No,
}

impl MeetsRequirement {
    pub const fn label(self) -> &'static str {
        match self {
            MeetsRequirement::Yes => "yes",
            MeetsRequirement::Partial => "partial",
            MeetsRequirement::No => "no",
        }
    }
}

/// Stored rows may carry `null` notes or unexpected requirement labels; both
/// read as the defaults instead of failing the entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionResponse {
    #[serde(default, deserialize_with = "lenient_requirement")]
    pub meets_requirement: MeetsRequirement,
    #[serde(default, deserialize_with = "lenient_notes")]
    pub notes: String,
}

fn lenient_requirement<'de, D>(deserializer: D) -> Result<MeetsRequirement, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let label = value
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .map(|raw| raw.trim().to_ascii_lowercase());

    Ok(match label.as_deref() {
        Some("yes") => MeetsRequirement::Yes,
        Some("partial") => MeetsRequirement::Partial,
        _ => MeetsRequirement::No,
    })
}

fn lenient_notes<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(notes)) => notes,
        Some(serde_json::Value::Number(number)) => number.to_string(),
        _ => String::new(),
    })
}

/// Answers captured at submission time (`application_data`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationData {
    #[serde(default, deserialize_with = "criteria_entries")]
    pub criteria: BTreeMap<CriterionId, CriterionResponse>,
}

/// Reads `criteria` one entry at a time so a single bad entry only loses itself.
fn criteria_entries<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<CriterionId, CriterionResponse>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let Some(serde_json::Value::Object(entries)) =
        Option::<serde_json::Value>::deserialize(deserializer)?
    else {
        return Ok(BTreeMap::new());
    };

    let mut criteria = BTreeMap::new();
    for (key, entry) in entries {
        let Ok(id) = key.trim().parse::<i64>() else {
            tracing::warn!(key = %key, "skipping criterion answer with non-numeric id");
            continue;
        };
        match serde_json::from_value::<CriterionResponse>(entry) {
            Ok(response) => {
                criteria.insert(CriterionId(id), response);
            }
            Err(error) => {
                tracing::warn!(criterion_id = id, %error, "skipping unreadable criterion answer");
            }
        }
    }
    Ok(criteria)
}

impl ApplicationData {
    /// Parse the stored blob. Missing data, or a blob that is not a JSON
    /// object, yields an empty answer set.
    pub fn parse(raw: Option<&str>) -> Self {
        parse_blob(raw, "application_data")
    }

    /// Response for a criterion; an unanswered criterion reads as `no`.
    pub fn response_for(&self, id: CriterionId) -> CriterionResponse {
        self.criteria.get(&id).cloned().unwrap_or_default()
    }
}

/// Company metadata captured with the application (`company_data`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyData {
    pub company_name: Option<String>,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub additional_info: Option<String>,
}

impl CompanyData {
    pub fn parse(raw: Option<&str>) -> Self {
        parse_blob(raw, "company_data")
    }
}

fn parse_blob<T>(raw: Option<&str>, column: &'static str) -> T
where
    T: Default + for<'de> Deserialize<'de>,
{
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => T::default(),
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|error| {
            tracing::warn!(column, %error, "discarding unparseable application blob");
            T::default()
        }),
    }
}

/// Persisted application row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub application_number: String,
    pub standard_id: StandardId,
    pub applicant_id: UserId,
    pub certifier_id: UserId,
    pub status: ApplicationStatus,
    pub application_data: ApplicationData,
    pub company_data: CompanyData,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    /// Set when a certifier first opens the application for review.
    pub reviewed_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub issued_at: Option<DateTime<Utc>>,
    pub decision_notes: Option<String>,
    pub reviewer_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardSummary {
    pub id: StandardId,
    pub name: String,
    pub kind: String,
    pub validity_months: Option<i32>,
}

/// Account details joined onto an application (applicant or certifier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub id: UserId,
    pub company_name: String,
    pub contact_person: String,
    pub email: String,
    pub phone: Option<String>,
}

/// Contact details as displayed: submitted company data first, account data second.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactCard {
    pub company_name: String,
    pub contact_person: String,
    pub email: String,
    pub phone: Option<String>,
}

/// A criterion assessed under a standard. Read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: CriterionId,
    pub standard_id: StandardId,
    pub name: String,
    pub requirements: Option<String>,
    pub description: Option<String>,
    pub sort_order: i32,
    pub risk_assessment_required: bool,
}

/// Uploaded supporting document metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub application_id: ApplicationId,
    pub name: String,
    pub document_type: String,
    pub file_path: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Comment thread entry on an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discussion {
    pub id: i64,
    pub application_id: ApplicationId,
    pub user_id: UserId,
    pub author_name: String,
    pub author_role: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// A certifier's ruling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub const fn label(self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }

    pub const fn resulting_status(self) -> ApplicationStatus {
        match self {
            Decision::Approve => ApplicationStatus::Approved,
            Decision::Reject => ApplicationStatus::Rejected,
        }
    }

    /// Notification type and email template key for the outcome.
    pub fn outcome_key(self) -> String {
        format!("application_{}", self.resulting_status().label())
    }
}

impl FromStr for Decision {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "approve" => Ok(Decision::Approve),
            "reject" => Ok(Decision::Reject),
            other => Err(UnknownValue::new("decision", other)),
        }
    }
}

/// Certifier's per-criterion finding recorded in review history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertifierAssessment {
    Meets,
    Partial,
    NotMeets,
    Na,
}

impl CertifierAssessment {
    pub const fn label(self) -> &'static str {
        match self {
            CertifierAssessment::Meets => "meets",
            CertifierAssessment::Partial => "partial",
            CertifierAssessment::NotMeets => "not_meets",
            CertifierAssessment::Na => "na",
        }
    }
}

impl FromStr for CertifierAssessment {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "meets" => Ok(CertifierAssessment::Meets),
            "partial" => Ok(CertifierAssessment::Partial),
            "not_meets" => Ok(CertifierAssessment::NotMeets),
            "na" => Ok(CertifierAssessment::Na),
            other => Err(UnknownValue::new("assessment", other)),
        }
    }
}

/// Append-only audit record written once per decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewHistoryEntry {
    pub id: i64,
    pub application_id: ApplicationId,
    pub reviewer_id: UserId,
    pub action: Decision,
    pub notes: String,
    pub criteria_reviews: BTreeMap<CriterionId, CertifierAssessment>,
    pub created_at: DateTime<Utc>,
}

/// In-app notification row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: UserId,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Queued outbound email, consumed by the delivery worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailJob {
    pub id: i64,
    pub to_email: String,
    pub subject: String,
    pub template: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
