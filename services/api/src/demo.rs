use crate::infra::{seed_demo_store, DEMO_APPLICANT, DEMO_APPLICATION, DEMO_CERTIFIER};
use certolo::error::AppError;
use certolo::workflows::certification::{
    ApplicationStatus, CertificationService, CriterionId, EmailJob, MeetsRequirement,
    Notification, RequestContext, ReviewForm, ReviewHistoryEntry, ReviewPolicy, TimelineEvent,
};
use clap::Args;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Decision to record: approve or reject
    #[arg(long, default_value = "approve")]
    pub(crate) decision: String,
    /// Review notes sent to the applicant
    #[arg(long, default_value = "All criteria evidenced during the remote audit.")]
    pub(crate) notes: String,
    /// Base URL used for the link in the queued email
    #[arg(long, default_value = "http://localhost:3000")]
    pub(crate) site_url: String,
    /// Print the committed rows as JSON instead of a narrated walkthrough
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Debug, Serialize)]
struct DemoSummary {
    status: ApplicationStatus,
    review_history: Vec<ReviewHistoryEntry>,
    notifications: Vec<Notification>,
    email_jobs: Vec<EmailJob>,
    timeline: Vec<TimelineEvent>,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        decision,
        notes,
        site_url,
        json,
    } = args;

    let store = Arc::new(seed_demo_store()?);
    let service = CertificationService::new(store.clone(), ReviewPolicy::default(), site_url);
    let certifier = RequestContext::certifier(DEMO_CERTIFIER);

    if !json {
        println!("Certification review demo");
    }

    let workspace = match service.open_review(&certifier, DEMO_APPLICATION).await {
        Ok(workspace) => workspace,
        Err(err) => {
            println!("  Review screen unavailable: {}", err);
            return Ok(());
        }
    };
    if !json {
        let application = &workspace.record.application;
        println!(
            "- Opened {} ({}) for {} -> status {}",
            application.application_number,
            workspace.record.standard.name,
            workspace.contact.company_name,
            application.status.title()
        );
        println!("  Criteria:");
        for entry in &workspace.criteria {
            let notes = if entry.response.notes.is_empty() {
                "no notes"
            } else {
                entry.response.notes.as_str()
            };
            println!(
                "    {}. {}: applicant says {} ({})",
                entry.position,
                entry.criterion.name,
                entry.response.meets_requirement.label(),
                notes
            );
        }
        println!("  Documents (newest first):");
        for document in &workspace.documents {
            println!(
                "    - {} [{}] uploaded {}",
                document.name,
                document.document_type,
                document.uploaded_at.format("%Y-%m-%d")
            );
        }
    }

    let criteria_review: BTreeMap<CriterionId, String> = workspace
        .criteria
        .iter()
        .map(|entry| {
            let assessment = match entry.response.meets_requirement {
                MeetsRequirement::Yes => "meets",
                _ => "partial",
            };
            (entry.criterion.id, assessment.to_string())
        })
        .collect();
    let form = ReviewForm {
        csrf_token: Some("demo-token".to_string()),
        decision: Some(decision),
        decision_notes: Some(notes),
        criteria_review,
    };

    let outcome = match service
        .submit_review(&certifier, DEMO_APPLICATION, &form)
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            println!("  Submission rejected: {}", err);
            return Ok(());
        }
    };

    let view = match service
        .view_application(&RequestContext::applicant(DEMO_APPLICANT), DEMO_APPLICATION)
        .await
    {
        Ok(view) => view,
        Err(err) => {
            println!("  Applicant view unavailable: {}", err);
            return Ok(());
        }
    };

    let summary = DemoSummary {
        status: outcome.status,
        review_history: store.review_history_rows(),
        notifications: store.notifications(),
        email_jobs: store.email_jobs(),
        timeline: view.timeline,
    };

    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(payload) => println!("{}", payload),
            Err(err) => println!("Summary unavailable: {}", err),
        }
        return Ok(());
    }

    println!("- {}", outcome.message());
    for entry in &summary.review_history {
        println!(
            "  Review history #{}: {} by certifier {} ({} criteria assessed)",
            entry.id,
            entry.action.label(),
            entry.reviewer_id,
            entry.criteria_reviews.len()
        );
    }
    for notification in &summary.notifications {
        println!(
            "  Notification to user {}: {} | {}",
            notification.user_id, notification.title, notification.message
        );
    }
    for email in &summary.email_jobs {
        println!(
            "  Email queued to {}: \"{}\" (template {})",
            email.to_email, email.subject, email.template
        );
        if let Some(link) = email.data.get("view_link").and_then(|link| link.as_str()) {
            println!("    link: {}", link);
        }
    }
    println!("  Applicant timeline:");
    for event in &summary.timeline {
        println!(
            "    - {} at {}",
            event.label,
            event.at.format("%Y-%m-%d %H:%M UTC")
        );
    }

    Ok(())
}
