//! `/v1/lineage/{id}` - provenance chain of a section node.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn get_lineage(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let Some(client) = &state.sparql else {
        return Err(ApiError::Upstream("sparql endpoint unconfigured".into()));
    };
    let graph = state
        .graph_iri()
        .ok_or_else(|| ApiError::Upstream("no approved kg snapshot".into()))?;

    let section_id = ident::normalize_section_id(&id)?;
    let iri = ident::build_section_iri(&section_id)?;
    let query = kg::render_template("lineage", &graph, &iri)?;
    let body = client.query(&query).await?;

    let sources: Vec<String> = body
        .pointer("/results/bindings")
        .and_then(|v| v.as_array())
        .map(|bindings| {
            bindings
                .iter()
                .filter_map(|b| b.pointer("/src/value")?.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    if sources.is_empty() {
        return Err(ApiError::NotFound);
    }

    Ok(Json(json!({
        "section_id": section_id,
        "iri": iri,
        "derived_from": sources,
        "graph": graph,
    })))
}
