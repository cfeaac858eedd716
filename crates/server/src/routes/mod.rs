pub mod entities;
pub mod health;
pub mod lineage;
pub mod rag_query;
pub mod search;
pub mod sparql;

use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::error::ApiError;

/// Root route: service identity and the read-only endpoint map.
pub async fn api_info() -> impl IntoResponse {
    Json(json!({
        "service": "earcrawler-facade",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "/health",
            "/v1/entities/{id}",
            "/v1/search",
            "/v1/sparql",
            "/v1/lineage/{id}",
            "/v1/rag/query",
        ],
    }))
}

pub async fn not_found() -> impl IntoResponse {
    ApiError::NotFound
}
