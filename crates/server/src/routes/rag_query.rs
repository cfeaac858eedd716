//! `/v1/rag/query` - the cached, strict-contract answer surface.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use rag::RagRequest;
use serde::Deserialize;
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RagQueryRequest {
    pub question: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    5
}

const MAX_TOP_K: usize = 20;
const MAX_QUESTION_CHARS: usize = 2_000;

pub async fn rag_query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RagQueryRequest>,
) -> ApiResult<impl IntoResponse> {
    let Some(pipeline) = &state.rag else {
        return Err(ApiError::Upstream("rag pipeline unconfigured".into()));
    };
    let question = request.question.trim();
    if question.is_empty() {
        return Err(ApiError::InvalidInput("question must be non-empty".into()));
    }
    if question.chars().count() > MAX_QUESTION_CHARS {
        return Err(ApiError::InvalidInput(format!(
            "question exceeds {MAX_QUESTION_CHARS} characters"
        )));
    }
    if request.top_k == 0 || request.top_k > MAX_TOP_K {
        return Err(ApiError::InvalidInput(format!(
            "top_k must be in 1..={MAX_TOP_K}"
        )));
    }

    let answer = pipeline
        .query(&RagRequest {
            question: question.to_string(),
            top_k: request.top_k,
        })
        .await?;

    Ok(Json(json!({
        "label": answer.label,
        "answer": answer.answer,
        "citations": answer.citations,
        "rationale": answer.rationale,
        "refusal_reason": answer.refusal_reason,
        "grounded": answer.grounded,
    })))
}
