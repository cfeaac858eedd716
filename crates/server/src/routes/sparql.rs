//! `/v1/sparql` - template-allowlisted SPARQL only.
//!
//! The request names a registered template and an IRI parameter; raw query
//! strings are rejected at the type level by simply not having a field for
//! them.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SparqlRequest {
    pub template: String,
    pub iri: String,
}

pub async fn sparql(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SparqlRequest>,
) -> ApiResult<impl IntoResponse> {
    let Some(client) = &state.sparql else {
        return Err(ApiError::Upstream("sparql endpoint unconfigured".into()));
    };
    let graph = state
        .graph_iri()
        .ok_or_else(|| ApiError::Upstream("no approved kg snapshot".into()))?;

    let query = kg::render_template(&request.template, &graph, &request.iri)?;
    let body = client.query(&query).await?;

    Ok(Json(json!({
        "template": request.template,
        "graph": graph,
        "results": body,
    })))
}
