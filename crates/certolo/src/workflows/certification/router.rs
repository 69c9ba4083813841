use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, Path, State},
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde_json::json;

use super::domain::{ApplicationId, RequestContext, Role, UserId};
use super::repository::CertificationStore;
use super::service::{CertificationError, CertificationService};
use super::validation::{FieldError, ReviewForm};

/// Authenticated account id, set by the upstream session gateway.
pub const USER_ID_HEADER: &str = "x-certolo-user-id";
/// `applicant` or `certifier`, set by the upstream session gateway.
pub const ROLE_HEADER: &str = "x-certolo-role";
/// Double-submit anti-forgery token; must equal the form's `csrf_token`.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Router builder exposing the view and review endpoints.
pub fn certification_router<S>(service: Arc<CertificationService<S>>) -> Router
where
    S: CertificationStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/applications/:application_id",
            get(view_handler::<S>),
        )
        .route(
            "/api/v1/applications/:application_id/review",
            get(open_review_handler::<S>).post(submit_review_handler::<S>),
        )
        .with_state(service)
}

/// Caller identity extracted from gateway headers.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
    csrf_token: Option<String>,
}

impl Caller {
    /// Build the request context, checking the double-submitted token when a form carries one.
    pub fn context(&self, form_token: Option<&str>) -> RequestContext {
        let csrf_verified = match (self.csrf_token.as_deref(), form_token) {
            (Some(header), Some(form)) => !header.is_empty() && tokens_match(header, form),
            _ => false,
        };

        RequestContext {
            user_id: self.user_id,
            role: self.role,
            csrf_verified,
        }
    }

    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());

        let user_id = header(USER_ID_HEADER)?.trim().parse::<i64>().ok()?;
        let role = header(ROLE_HEADER)?.parse::<Role>().ok()?;

        Some(Self {
            user_id: UserId(user_id),
            role,
            csrf_token: header(CSRF_HEADER).map(str::to_string),
        })
    }
}

fn tokens_match(expected: &str, presented: &str) -> bool {
    let (expected, presented) = (expected.as_bytes(), presented.as_bytes());
    expected.len() == presented.len()
        && expected
            .iter()
            .zip(presented)
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
}

#[axum::async_trait]
impl<St> FromRequestParts<St> for Caller
where
    St: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        Caller::from_headers(&parts.headers).ok_or_else(|| {
            let payload = json!({ "error": "authentication required" });
            (StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response()
        })
    }
}

pub(crate) async fn view_handler<S>(
    State(service): State<Arc<CertificationService<S>>>,
    caller: Caller,
    Path(application_id): Path<i64>,
) -> Response
where
    S: CertificationStore + 'static,
{
    let ctx = caller.context(None);
    match service
        .view_application(&ctx, ApplicationId(application_id))
        .await
    {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => failure_response(error),
    }
}

pub(crate) async fn open_review_handler<S>(
    State(service): State<Arc<CertificationService<S>>>,
    caller: Caller,
    Path(application_id): Path<i64>,
) -> Response
where
    S: CertificationStore + 'static,
{
    let ctx = caller.context(None);
    match service.open_review(&ctx, ApplicationId(application_id)).await {
        Ok(workspace) => (StatusCode::OK, axum::Json(workspace)).into_response(),
        Err(error) => failure_response(error),
    }
}

pub(crate) async fn submit_review_handler<S>(
    State(service): State<Arc<CertificationService<S>>>,
    caller: Caller,
    Path(application_id): Path<i64>,
    payload: Result<axum::Json<ReviewForm>, JsonRejection>,
) -> Response
where
    S: CertificationStore + 'static,
{
    let form = match payload {
        Ok(axum::Json(form)) => form,
        Err(rejection) => {
            tracing::warn!(
                application_id,
                user_id = %caller.user_id,
                reason = %rejection.body_text(),
                "unreadable review form"
            );
            let errors = [FieldError {
                field: "form".to_string(),
                message: "The review form could not be read.".to_string(),
            }];
            let payload = json!({ "errors": errors });
            return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
        }
    };
    let ctx = caller.context(form.csrf_token.as_deref());
    match service
        .submit_review(&ctx, ApplicationId(application_id), &form)
        .await
    {
        Ok(outcome) => {
            let payload = json!({
                "application_id": outcome.application_id,
                "decision": outcome.decision,
                "status": outcome.status,
                "message": outcome.message(),
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => failure_response(error),
    }
}

fn failure_response(error: CertificationError) -> Response {
    match error {
        CertificationError::Validation(errors) => {
            let payload = json!({ "errors": errors.errors });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        CertificationError::NotFoundOrForbidden | CertificationError::NotFound => {
            let payload = json!({ "error": "application not found" });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        CertificationError::Forbidden(denied) => {
            let payload = json!({ "error": denied.to_string() });
            (StatusCode::FORBIDDEN, axum::Json(payload)).into_response()
        }
        CertificationError::SubmissionFailed => {
            let payload = json!({ "error": CertificationError::SubmissionFailed.to_string() });
            (StatusCode::SERVICE_UNAVAILABLE, axum::Json(payload)).into_response()
        }
        CertificationError::Repository(source) => {
            tracing::error!(error = %source, "certification request failed");
            let payload = json!({ "error": "internal server error" });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}
