//! `/v1/entities/{id}` - entity lookup through the allowlisted template.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn get_entity(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let Some(client) = &state.sparql else {
        return Err(ApiError::Upstream("sparql endpoint unconfigured".into()));
    };
    let graph = state
        .graph_iri()
        .ok_or_else(|| ApiError::Upstream("no approved kg snapshot".into()))?;

    if id.trim().is_empty() || id.len() > 256 {
        return Err(ApiError::InvalidInput("entity id out of bounds".into()));
    }
    let iri = format!("{}{}", ident::ENTITY_NS, id.replace(' ', "-"));
    let query = kg::render_template("entity", &graph, &iri)?;
    let body = client.query(&query).await?;

    let bindings = body
        .pointer("/results/bindings")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    if bindings.is_empty() {
        return Err(ApiError::NotFound);
    }

    let properties: Vec<_> = bindings
        .iter()
        .filter_map(|b| {
            Some(json!({
                "predicate": b.pointer("/p/value")?.as_str()?,
                "object": b.pointer("/o/value")?.as_str()?,
            }))
        })
        .collect();

    Ok(Json(json!({
        "id": id,
        "iri": iri,
        "graph": graph,
        "properties": properties,
    })))
}
