//! Read-mostly SPARQL endpoint client.
//!
//! The triple store is an opaque collaborator reached over HTTP through the
//! cassette-cached client, so integrity checks replay offline in CI. The
//! only write is the emitter's validated load; everything else is `query`,
//! `ask`, or a graph dump.

use std::collections::BTreeMap;

use fetch::CachedHttpClient;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::Value;
use tracing::debug;

use crate::error::KgError;

const QUERY_COMPONENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'&')
    .add(b'+')
    .add(b'%')
    .add(b'?')
    .add(b'/')
    .add(b':')
    .add(b'{')
    .add(b'}')
    .add(b'=');

/// Percent-encode a SPARQL query for the `query=` URL component. Public so
/// tests and tools can derive the exact URL (and cassette key) the client
/// will use.
pub fn encode_query(sparql: &str) -> String {
    utf8_percent_encode(sparql, QUERY_COMPONENT).to_string()
}

pub struct SparqlClient {
    base_url: String,
    client: CachedHttpClient,
}

impl SparqlClient {
    pub fn new(base_url: impl Into<String>, client: CachedHttpClient) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url, client }
    }

    /// Run a SELECT/CONSTRUCT query; returns the SPARQL JSON results body.
    pub async fn query(&self, sparql: &str) -> Result<Value, KgError> {
        let url = format!("{}/query?query={}", self.base_url, encode_query(sparql));
        let mut headers = BTreeMap::new();
        headers.insert(
            "accept".to_string(),
            "application/sparql-results+json".to_string(),
        );
        let response = self.client.get(&url, &headers).await?;
        debug!(status = response.status, "sparql_query");
        Ok(response.json()?)
    }

    /// Run an ASK query and return its boolean.
    pub async fn ask(&self, sparql: &str) -> Result<bool, KgError> {
        let body = self.query(sparql).await?;
        body.get("boolean")
            .and_then(Value::as_bool)
            .ok_or_else(|| KgError::EndpointResponse("missing boolean in ASK response".into()))
    }

    /// Load canonical N-Quads into a named graph via the graph-store
    /// protocol. This is the single write path to the store.
    pub async fn load_graph(&self, graph_iri: &str, nquads: &str) -> Result<(), KgError> {
        let url = format!(
            "{}/data?graph={}",
            self.base_url,
            utf8_percent_encode(graph_iri, QUERY_COMPONENT)
        );
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/n-quads".to_string());
        self.client.post(&url, &headers, nquads.as_bytes()).await?;
        Ok(())
    }

    /// Dump a named graph as N-Quads text.
    pub async fn dump_graph(&self, graph_iri: &str) -> Result<String, KgError> {
        let url = format!(
            "{}/data?graph={}",
            self.base_url,
            utf8_percent_encode(graph_iri, QUERY_COMPONENT)
        );
        let mut headers = BTreeMap::new();
        headers.insert("accept".to_string(), "application/n-quads".to_string());
        let response = self.client.get(&url, &headers).await?;
        Ok(response.text()?)
    }
}

/// Normalize an N-Quads dump for comparison: trim, drop blank lines, sort.
/// With no blank nodes in the schema, sorted-line equality is graph
/// isomorphism.
pub fn canonical_sort_nquads(dump: &str) -> String {
    let mut lines: Vec<&str> = dump
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    lines.sort_unstable();
    let mut out = lines.join("\n");
    out.push('\n');
    out
}
