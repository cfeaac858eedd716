//! Router assembly and server lifecycle.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::{guard, log_requests, request_id};
use crate::routes::{api_info, entities, health, lineage, not_found, rag_query, search, sparql};
use crate::state::AppState;

/// Build the facade router.
///
/// Stack, outermost first: request id → logging → timeout → body cap →
/// identity/rate-limit/concurrency guard → routes. `/health` sits outside
/// the guard so probes never consume a caller's budget.
pub fn build_router(state: Arc<AppState>) -> Router {
    let guarded = Router::new()
        .route("/v1/entities/{id}", get(entities::get_entity))
        .route("/v1/search", get(search::search))
        .route("/v1/sparql", post(sparql::sparql))
        .route("/v1/lineage/{id}", get(lineage::get_lineage))
        .route("/v1/rag/query", post(rag_query::rag_query))
        .layer(from_fn_with_state(state.clone(), guard));

    Router::new()
        .route("/", get(api_info))
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .merge(guarded)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_millis(state.config.timeout_ms),
        ))
        .layer(from_fn(request_id))
        .layer(from_fn(log_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the facade and block until shutdown.
pub async fn start_server(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = state.config.socket_addr()?;
    info!(
        %addr,
        timeout_ms = state.config.timeout_ms,
        max_body_bytes = state.config.max_body_bytes,
        max_in_flight = state.config.max_in_flight,
        api_keys = state.config.api_keys.len(),
        "facade_starting"
    );

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("facade_stopped");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("install ctrl+c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl+c, shutting down"),
        _ = terminate => info!("received sigterm, shutting down"),
    }
}
