//! Notification and email payloads written alongside a decision.

use serde_json::json;

use super::domain::{ApplicationId, Decision};
use super::repository::{ApplicationRecord, NewEmailJob, NewNotification};

/// Link to the applicant-facing application page.
pub fn application_link(site_url: &str, id: ApplicationId) -> String {
    format!("{}/applications/view/{}", site_url.trim_end_matches('/'), id)
}

pub fn decision_notification(record: &ApplicationRecord, decision: Decision) -> NewNotification {
    let status = decision.resulting_status();
    NewNotification {
        user_id: record.application.applicant_id,
        kind: decision.outcome_key(),
        title: format!("Application {}", status.title()),
        message: format!(
            "Your application for {} has been {}.",
            record.standard.name,
            status.label()
        ),
        data: json!({ "application_id": record.application.id }),
    }
}

pub fn decision_email(
    record: &ApplicationRecord,
    decision: Decision,
    notes: &str,
    site_url: &str,
) -> NewEmailJob {
    let status = decision.resulting_status();
    NewEmailJob {
        to_email: record.applicant.email.clone(),
        subject: format!(
            "Application {} - {}",
            status.title(),
            record.application.application_number
        ),
        template: decision.outcome_key(),
        data: json!({
            "applicant_name": record.applicant.contact_person,
            "application_number": record.application.application_number,
            "standard_name": record.standard.name,
            "decision_notes": notes,
            "view_link": application_link(site_url, record.application.id),
        }),
    }
}
