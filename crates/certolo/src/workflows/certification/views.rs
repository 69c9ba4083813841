use serde::Serialize;

use super::domain::{
    ApplicationData, ContactCard, Criterion, CriterionResponse, Discussion, Document,
    ReviewHistoryEntry,
};
use super::lifecycle::{AvailableAction, TimelineEvent};
use super::repository::ApplicationRecord;

/// A criterion paired with the applicant's answer, numbered for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CriterionReview {
    pub position: usize,
    pub criterion: Criterion,
    pub response: CriterionResponse,
}

pub fn pair_responses(criteria: Vec<Criterion>, answers: &ApplicationData) -> Vec<CriterionReview> {
    criteria
        .into_iter()
        .enumerate()
        .map(|(index, criterion)| CriterionReview {
            position: index + 1,
            response: answers.response_for(criterion.id),
            criterion,
        })
        .collect()
}

/// Everything the certifier's review screen renders.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewWorkspace {
    pub record: ApplicationRecord,
    pub contact: ContactCard,
    pub criteria: Vec<CriterionReview>,
    pub documents: Vec<Document>,
}

/// Read-only application page for the owning applicant or assigned certifier.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationView {
    pub record: ApplicationRecord,
    pub contact: ContactCard,
    pub criteria: Vec<CriterionReview>,
    pub documents: Vec<Document>,
    pub discussions: Vec<Discussion>,
    pub review_history: Vec<ReviewHistoryEntry>,
    pub timeline: Vec<TimelineEvent>,
    pub actions: Vec<AvailableAction>,
}
