//! KG expansion of citation context.
//!
//! For each candidate citation the expander runs the allowlisted
//! `neighbors` template against the read-only endpoint and folds the
//! bindings into short context summaries. Endpoint failures degrade to no
//! expansion; they never fail the query.

use kg::{render_template, SparqlClient};
use tracing::warn;

/// One expanded context item for the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct KgContext {
    pub subject: String,
    pub summary: String,
}

/// Expand section ids through their KG neighbors.
pub async fn expand_citations(
    client: &SparqlClient,
    graph_iri: &str,
    section_ids: &[String],
) -> Vec<KgContext> {
    let mut out = Vec::new();
    for section_id in section_ids {
        let Ok(iri) = ident::build_section_iri(section_id) else {
            continue;
        };
        let query = match render_template("neighbors", graph_iri, &iri) {
            Ok(q) => q,
            Err(err) => {
                warn!(section_id, error = %err, "kg_expansion_template_rejected");
                continue;
            }
        };
        match client.query(&query).await {
            Ok(body) => {
                let bindings = body
                    .pointer("/results/bindings")
                    .and_then(|v| v.as_array())
                    .cloned()
                    .unwrap_or_default();
                let mut parts: Vec<String> = bindings
                    .iter()
                    .filter_map(|b| {
                        let p = b.pointer("/p/value")?.as_str()?;
                        let o = b.pointer("/o/value")?.as_str()?;
                        Some(format!("{} -> {}", local_name(p), o))
                    })
                    .collect();
                parts.sort();
                parts.dedup();
                if !parts.is_empty() {
                    out.push(KgContext {
                        subject: iri,
                        summary: parts.join("; "),
                    });
                }
            }
            Err(err) => {
                // Expansion is best-effort; retrieval grounding does not
                // depend on the endpoint being reachable.
                warn!(section_id, error = %err, "kg_expansion_failed");
            }
        }
    }
    out
}

fn local_name(iri: &str) -> &str {
    iri.rsplit(['#', '/']).next().unwrap_or(iri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetch::{CachedHttpClient, Cassette, CassetteStore, FetchConfig};
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn unreachable_endpoint_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let client = SparqlClient::new(
            "http://fuseki.test/ear",
            CachedHttpClient::new(FetchConfig::new(dir.path())).unwrap(),
        );
        let out = expand_citations(
            &client,
            "https://ear.example.org/graph/kg/abc",
            &["EAR-736.2".to_string()],
        )
        .await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn bindings_folded_into_summary() {
        let dir = tempfile::tempdir().unwrap();
        let graph = "https://ear.example.org/graph/kg/abc";
        let iri = ident::build_section_iri("EAR-736.2").unwrap();
        let query = render_template("neighbors", graph, &iri).unwrap();
        let url = format!(
            "http://fuseki.test/ear/query?query={}",
            kg::endpoint::encode_query(&query)
        );
        let body = serde_json::json!({
            "head": {"vars": ["p", "o"]},
            "results": {"bindings": [
                {"p": {"type": "uri", "value": "https://ear.example.org/schema#partOf"},
                 "o": {"type": "uri", "value": "https://ear.example.org/resource/ear/section/EAR-736.1"}}
            ]}
        });
        let mut headers = BTreeMap::new();
        headers.insert(
            "accept".to_string(),
            "application/sparql-results+json".to_string(),
        );
        let key = CassetteStore::key("GET", &url, &headers, b"");
        CassetteStore::new(dir.path())
            .store(
                &key,
                &Cassette::from_parts(200, &BTreeMap::new(), body.to_string().as_bytes()),
            )
            .unwrap();

        let client = SparqlClient::new(
            "http://fuseki.test/ear",
            CachedHttpClient::new(FetchConfig::new(dir.path())).unwrap(),
        );
        let out = expand_citations(&client, graph, &["EAR-736.2".to_string()]).await;
        assert_eq!(out.len(), 1);
        assert!(out[0].summary.contains("partOf"));
    }
}
