//! Liveness + readiness.
//!
//! Readiness aggregates what an operator actually pages on: endpoint
//! latency, template registry size, limiter pressure, and free disk.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let uptime_seconds = state
        .started_at
        .elapsed()
        .map(|d| d.as_secs())
        .unwrap_or(0);

    // Probe the endpoint with the cheapest possible ASK; absence of an
    // endpoint is a degraded-but-alive state, not a failure.
    let (sparql_status, sparql_latency_ms) = match &state.sparql {
        Some(client) => {
            let start = Instant::now();
            match client.ask("ASK { }").await {
                Ok(_) => ("ready", Some(start.elapsed().as_millis() as u64)),
                Err(_) => ("unreachable", None),
            }
        }
        None => ("unconfigured", None),
    };

    let free_disk_bytes = free_disk_bytes();

    Ok(Json(json!({
        "status": "ok",
        "service": "earcrawler-facade",
        "uptime_seconds": uptime_seconds,
        "corpus": {
            "digest": state.corpus.manifest.corpus_digest,
            "doc_count": state.corpus.manifest.doc_count,
        },
        "index": {
            "doc_count": state.index.len(),
            "embedding_model": state.index.sidecar().embedding_model,
        },
        "kg_digest": state.kg_manifest.as_ref().map(|m| m.digest.clone()),
        "sparql": { "status": sparql_status, "latency_ms": sparql_latency_ms },
        "templates": kg::template_names().len(),
        "limiter": { "tracked_identities": state.limiter.tracked_identities() },
        "free_disk_bytes": free_disk_bytes,
        "rag": if state.rag.is_some() { "ready" } else { "unconfigured" },
    })))
}

fn free_disk_bytes() -> Option<u64> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    disks.list().iter().map(|d| d.available_space()).max()
}

// One recorder per process; Lazy keeps repeated router builds (tests) from
// double-installing.
static PROMETHEUS: once_cell::sync::Lazy<metrics_exporter_prometheus::PrometheusHandle> =
    once_cell::sync::Lazy::new(|| {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .install_recorder()
            .expect("install prometheus recorder")
    });

/// Prometheus exposition endpoint.
pub async fn metrics() -> impl IntoResponse {
    PROMETHEUS.render()
}
