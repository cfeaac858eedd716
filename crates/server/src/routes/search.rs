//! `/v1/search` - vector search over the active corpus.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_k() -> usize {
    5
}

const MAX_K: usize = 50;

pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<impl IntoResponse> {
    let query = params.q.trim();
    if query.is_empty() {
        return Err(ApiError::InvalidInput("q must be non-empty".into()));
    }
    if params.k == 0 || params.k > MAX_K {
        return Err(ApiError::InvalidInput(format!("k must be in 1..={MAX_K}")));
    }

    let hits = state
        .index
        .search(state.embedder.as_ref(), query, params.k)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "query": query,
        "corpus_digest": state.corpus.manifest.corpus_digest,
        "hits": hits.iter().map(|h| json!({
            "doc_id": h.doc_id,
            "section_id": h.section_id,
            "score": h.score,
            "snippet": snippet(&h.text),
        })).collect::<Vec<_>>(),
    })))
}

fn snippet(text: &str) -> String {
    const MAX: usize = 280;
    if text.len() <= MAX {
        return text.to_string();
    }
    let mut end = MAX;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}
