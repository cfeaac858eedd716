//! Shared facade state, wired once at the composition root.

use std::sync::Arc;
use std::time::SystemTime;

use corpus::Corpus;
use governance::sha256_hex;
use index::{Embedder, VectorIndex};
use kg::{KgManifest, SparqlClient};
use rag::RagPipeline;

use crate::config::FacadeConfig;
use crate::limit::RateLimiter;

/// Caller identity for rate limiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Anonymous(String),
    Keyed(String),
}

impl Identity {
    pub fn bucket_key(&self) -> String {
        match self {
            Identity::Anonymous(ip) => format!("anon:{ip}"),
            Identity::Keyed(hash) => format!("key:{hash}"),
        }
    }
}

pub struct AppState {
    pub config: FacadeConfig,
    pub limiter: RateLimiter,
    pub in_flight: tokio::sync::Semaphore,
    pub corpus: Arc<Corpus>,
    pub index: Arc<VectorIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub rag: Option<Arc<RagPipeline>>,
    pub sparql: Option<Arc<SparqlClient>>,
    pub kg_manifest: Option<KgManifest>,
    pub started_at: SystemTime,
}

impl AppState {
    pub fn new(
        config: FacadeConfig,
        corpus: Arc<Corpus>,
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let in_flight = tokio::sync::Semaphore::new(config.max_in_flight);
        Self {
            config,
            limiter: RateLimiter::new(),
            in_flight,
            corpus,
            index,
            embedder,
            rag: None,
            sparql: None,
            kg_manifest: None,
            started_at: SystemTime::now(),
        }
    }

    pub fn with_rag(mut self, rag: Arc<RagPipeline>) -> Self {
        self.rag = Some(rag);
        self
    }

    pub fn with_sparql(mut self, client: Arc<SparqlClient>, manifest: KgManifest) -> Self {
        self.sparql = Some(client);
        self.kg_manifest = Some(manifest);
        self
    }

    /// Resolve caller identity. A presented key must be known; a valid key
    /// is identified by its hash (the raw key never reaches logs or
    /// limiter state).
    pub fn identify(&self, api_key: Option<&str>, client_ip: &str) -> Result<Identity, ()> {
        match api_key {
            Some(key) => {
                if self.config.api_keys.contains(key) {
                    Ok(Identity::Keyed(sha256_hex(key.as_bytes())[..16].to_string()))
                } else {
                    Err(())
                }
            }
            None => Ok(Identity::Anonymous(client_ip.to_string())),
        }
    }

    /// The named graph queries run against, derived from the manifest.
    pub fn graph_iri(&self) -> Option<String> {
        self.kg_manifest
            .as_ref()
            .map(|m| ident::graph_iri(&m.digest))
    }
}
