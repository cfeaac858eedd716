//! Problem-details error model.
//!
//! Every error kind maps to a stable `type` URI under
//! `https://ear.example.org/problems/`; bodies carry the request's
//! `trace_id` and never a stack trace. Messages pass through the shared
//! redaction pass on the way out.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use governance::redact_text;
use serde::Serialize;
use serde_json::json;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("not found")]
    NotFound,

    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("concurrency ceiling reached")]
    TooManyInFlight,

    #[error("request timed out")]
    Timeout,

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error("integrity failure: {0}")]
    IntegrityFailure(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::AuthorizationDenied(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::TooManyInFlight => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Timeout => StatusCode::REQUEST_TIMEOUT,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::ContractViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::IntegrityFailure(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Conflict(_) => StatusCode::CONFLICT,
        }
    }

    /// Stable problem-type slug; clients switch on this, not on messages.
    pub fn problem_type(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "invalid-input",
            ApiError::AuthorizationDenied(_) => "authorization-denied",
            ApiError::NotFound => "not-found",
            ApiError::RateLimited { .. } => "resource-exhausted",
            ApiError::BodyTooLarge(_) => "resource-exhausted",
            ApiError::TooManyInFlight => "resource-exhausted",
            ApiError::Timeout => "timeout",
            ApiError::Upstream(_) => "upstream",
            ApiError::ContractViolation(_) => "contract-violation",
            ApiError::IntegrityFailure(_) => "integrity-failure",
            ApiError::Conflict(_) => "conflict",
            ApiError::Internal(_) => "internal",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    pub trace_id: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "type": format!("https://ear.example.org/problems/{}", self.problem_type()),
            "title": self.problem_type(),
            "status": status.as_u16(),
            "detail": redact_text(&self.to_string()),
            "trace_id": crate::middleware::current_trace_id(),
        }));
        let mut response = (status, body).into_response();
        if let ApiError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = retry_after_secs.to_string().parse() {
                response.headers_mut().insert("retry-after", value);
            }
        }
        response
    }
}

impl From<rag::RagError> for ApiError {
    fn from(err: rag::RagError) -> Self {
        match err {
            rag::RagError::ContractViolation(m) => ApiError::ContractViolation(m),
            rag::RagError::Generator(m) => ApiError::Upstream(m),
            rag::RagError::Kg(e) => ApiError::Upstream(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<kg::KgError> for ApiError {
    fn from(err: kg::KgError) -> Self {
        match err {
            kg::KgError::ContractViolation(m) => ApiError::InvalidInput(m),
            kg::KgError::Endpoint(e) => ApiError::Upstream(e.to_string()),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<ident::IdError> for ApiError {
    fn from(err: ident::IdError) -> Self {
        ApiError::InvalidInput(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_is_stable() {
        assert_eq!(
            ApiError::RateLimited { retry_after_secs: 2 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::BodyTooLarge(1).status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(ApiError::Timeout.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[test]
    fn problem_types_cover_taxonomy() {
        assert_eq!(
            ApiError::InvalidInput("x".into()).problem_type(),
            "invalid-input"
        );
        assert_eq!(
            ApiError::RateLimited { retry_after_secs: 1 }.problem_type(),
            "resource-exhausted"
        );
        assert_eq!(
            ApiError::IntegrityFailure("x".into()).problem_type(),
            "integrity-failure"
        );
    }
}
