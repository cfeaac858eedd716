//! Trade.gov Consolidated Screening List source.
//!
//! Entities reach the emitter as [`EntityRecord`]s. The live pull goes
//! through the cassette-cached client, so CI replays a recorded response
//! and never needs the credential; the API key is looked up from the
//! environment at call time and travels in a header that is excluded from
//! cassette keys and scrubbed from stored cassettes.

use std::collections::BTreeMap;

use fetch::CachedHttpClient;
use serde::Deserialize;
use tracing::info;

use crate::emit::EntityRecord;
use crate::error::KgError;

pub const CSL_SEARCH_URL: &str = "https://data.trade.gov/consolidated_screening_list/v1/search";

/// Environment variable holding the Trade.gov subscription key. A platform
/// secret store should populate it; the value itself never reaches logs,
/// cassettes, or audit payloads.
pub const TRADE_GOV_API_KEY_VAR: &str = "TRADE_GOV_API_KEY";

#[derive(Debug, Deserialize)]
struct CslResponse {
    #[serde(default)]
    results: Vec<CslResult>,
}

#[derive(Debug, Deserialize)]
struct CslResult {
    id: String,
    name: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    source_information_url: Option<String>,
    #[serde(default)]
    alt_names: Vec<String>,
}

/// Fetch screening-list entities for the given sources (for example
/// `["EL"]` for the Entity List). Results come back sorted by id so the
/// emitter's inputs are order-independent of the API.
pub async fn fetch_entities(
    client: &CachedHttpClient,
    sources: &[&str],
) -> Result<Vec<EntityRecord>, KgError> {
    let url = format!("{CSL_SEARCH_URL}?sources={}", sources.join(","));
    let mut headers = BTreeMap::new();
    if let Ok(key) = std::env::var(TRADE_GOV_API_KEY_VAR) {
        if !key.is_empty() {
            headers.insert("subscription-key".to_string(), key);
        }
    }
    headers.insert("accept".to_string(), "application/json".to_string());

    let response = client.get(&url, &headers).await?;
    let body: CslResponse = response.json()?;

    let mut entities: Vec<EntityRecord> = body
        .results
        .into_iter()
        .map(|result| EntityRecord {
            entity_id: format!("csl-{}", result.id),
            label: result.name,
            kind: result.source.unwrap_or_else(|| "csl".to_string()),
            source_url: result.source_information_url,
            // Alternate names are descriptive literals downstream, never
            // identity links; keep them sorted for stable emission.
            same_as: {
                let mut names = result.alt_names;
                names.sort();
                names.dedup();
                names
            },
        })
        .collect();
    entities.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));

    info!(count = entities.len(), sources = ?sources, "csl_entities_fetched");
    Ok(entities)
}
