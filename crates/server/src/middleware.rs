//! Facade middleware: trace ids, identity + rate limiting, concurrency
//! ceiling, request logging.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

tokio::task_local! {
    /// Trace id for the in-flight request; read by the problem-details
    /// serializer so error bodies and the `X-Request-Id` header agree.
    pub static TRACE_ID: String;
}

/// Current trace id, empty outside a request scope.
pub fn current_trace_id() -> String {
    TRACE_ID.try_with(|t| t.clone()).unwrap_or_default()
}

/// Generate or propagate the request id and expose it as `X-Request-Id`.
pub async fn request_id(request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut response = TRACE_ID.scope(id.clone(), next.run(request)).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Identity resolution + token-bucket rate limiting + in-flight ceiling.
pub async fn guard(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let api_key = request
        .headers()
        .get("x-api-key")
        .or_else(|| request.headers().get(AUTHORIZATION))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.strip_prefix("Bearer ").unwrap_or(s).to_string());

    let client_ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .unwrap_or("unknown")
        .trim()
        .to_string();

    let identity = match state.identify(api_key.as_deref(), &client_ip) {
        Ok(identity) => identity,
        Err(()) => {
            metrics::counter!("facade_auth_failures_total").increment(1);
            return ApiError::AuthorizationDenied("unknown api key".into()).into_response();
        }
    };

    let (rpm, burst) = match &identity {
        crate::state::Identity::Anonymous(_) => (state.config.anon_rpm, state.config.anon_burst),
        crate::state::Identity::Keyed(_) => (state.config.keyed_rpm, state.config.keyed_burst),
    };
    let decision = state.limiter.check(&identity.bucket_key(), rpm, burst);
    if !decision.allowed {
        metrics::counter!("facade_throttled_total").increment(1);
        let mut response = ApiError::RateLimited {
            retry_after_secs: decision.retry_after_secs.max(1),
        }
        .into_response();
        set_rate_headers(&mut response, decision.limit_rpm, decision.remaining);
        return response;
    }

    // In-flight ceiling: shed rather than queue, so the timeout budget
    // stays meaningful under load.
    let Ok(_permit) = state.in_flight.try_acquire() else {
        metrics::counter!("facade_shed_total").increment(1);
        return ApiError::TooManyInFlight.into_response();
    };

    let mut response = next.run(request).await;
    set_rate_headers(&mut response, decision.limit_rpm, decision.remaining);
    response
}

fn set_rate_headers(response: &mut Response, limit: u32, remaining: u32) {
    if let Ok(value) = HeaderValue::from_str(&limit.to_string()) {
        response.headers_mut().insert("x-ratelimit-limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
        response
            .headers_mut()
            .insert("x-ratelimit-remaining", value);
    }
}

/// Structured request logging with latency and status.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();

    let response = next.run(request).await;
    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_millis() as u64;

    metrics::counter!("facade_requests_total", "path" => path.clone(), "status" => status.to_string())
        .increment(1);
    metrics::histogram!("facade_request_duration_ms", "path" => path.clone())
        .record(duration_ms as f64);
    info!(%method, path, status, duration_ms, trace_id = %current_trace_id(), "request");
    response
}
