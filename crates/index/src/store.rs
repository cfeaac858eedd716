//! Vector store: build, persist, load (fail-closed), search.

use std::path::Path;

use corpus::{Corpus, CorpusManifest};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::embed::{dot, Embedder};
use crate::error::IndexError;
use crate::sidecar::{IndexSidecar, SidecarSnapshot};

pub const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    doc_id: String,
    section_id: String,
    text: String,
    vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchHit {
    pub doc_id: String,
    pub section_id: String,
    pub score: f32,
    pub text: String,
}

/// The dense index. No mutable state: build it, persist it, search it.
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    sidecar: IndexSidecar,
}

impl VectorIndex {
    /// Embed every corpus document. Entries inherit the corpus ordering,
    /// which is already canonical.
    pub fn build(
        corpus: &Corpus,
        snapshot: SidecarSnapshot,
        embedder: &dyn Embedder,
        built_at: &str,
    ) -> Self {
        let entries: Vec<IndexEntry> = corpus
            .docs
            .iter()
            .map(|doc| IndexEntry {
                doc_id: doc.doc_id.clone(),
                section_id: doc.section_id.clone(),
                text: doc.text.clone(),
                vector: embedder.embed(&doc.text),
            })
            .collect();
        let sidecar = IndexSidecar {
            corpus_digest: corpus.manifest.corpus_digest.clone(),
            embedding_model: embedder.model_id().to_string(),
            built_at: built_at.to_string(),
            doc_count: entries.len(),
            snapshot,
        };
        info!(
            doc_count = entries.len(),
            model = %sidecar.embedding_model,
            "index_built"
        );
        Self { entries, sidecar }
    }

    pub fn sidecar(&self) -> &IndexSidecar {
        &self.sidecar
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn write(&self, dir: &Path) -> Result<(), IndexError> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join(INDEX_FILE), serde_json::to_vec(&self.entries)?)?;
        self.sidecar.write(dir)?;
        Ok(())
    }

    /// Load an index directory and verify its sidecar against the active
    /// corpus and the embedder that will serve queries. Any mismatch is
    /// [`IndexError::Stale`] - the caller rebuilds instead of serving.
    pub fn load(
        dir: &Path,
        active: &CorpusManifest,
        embedder: &dyn Embedder,
    ) -> Result<Self, IndexError> {
        let sidecar = IndexSidecar::load(dir)?;
        if sidecar.corpus_digest != active.corpus_digest {
            return Err(IndexError::Stale(format!(
                "sidecar corpus {} != active corpus {}",
                sidecar.corpus_digest, active.corpus_digest
            )));
        }
        if sidecar.embedding_model != embedder.model_id() {
            return Err(IndexError::Stale(format!(
                "sidecar model {} != active model {}",
                sidecar.embedding_model,
                embedder.model_id()
            )));
        }
        let entries: Vec<IndexEntry> =
            serde_json::from_slice(&std::fs::read(dir.join(INDEX_FILE))?)?;
        if entries.len() != sidecar.doc_count {
            return Err(IndexError::Stale(format!(
                "sidecar doc_count {} != stored entries {}",
                sidecar.doc_count,
                entries.len()
            )));
        }
        Ok(Self { entries, sidecar })
    }

    /// Exact cosine top-k. Ties break on `doc_id` so results are stable.
    pub fn search(
        &self,
        embedder: &dyn Embedder,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        if embedder.model_id() != self.sidecar.embedding_model {
            return Err(IndexError::Stale(format!(
                "query model {} != index model {}",
                embedder.model_id(),
                self.sidecar.embedding_model
            )));
        }
        let query_vec = embedder.embed(query);
        if let Some(entry) = self.entries.first() {
            if entry.vector.len() != query_vec.len() {
                return Err(IndexError::DimensionMismatch {
                    expected: entry.vector.len(),
                    actual: query_vec.len(),
                });
            }
        }

        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .map(|entry| SearchHit {
                doc_id: entry.doc_id.clone(),
                section_id: entry.section_id.clone(),
                score: dot(&entry.vector, &query_vec),
                text: entry.text.clone(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;
    use corpus::{build_corpus, validate_snapshot, CorpusConfig};

    fn fixture() -> (Corpus, SidecarSnapshot) {
        let dir = tempfile::tempdir().unwrap();
        let payload = concat!(
            "{\"section_id\":\"EAR-736.2\",\"text\":\"General prohibitions on exports without a license.\"}\n",
            "{\"section_id\":\"EAR-744.1\",\"text\":\"Entity list scope and license review policy.\"}\n",
            "{\"section_id\":\"EAR-772.1\",\"text\":\"Definitions of terms used in the regulations.\"}\n",
        );
        std::fs::write(dir.path().join("snapshot.jsonl"), payload).unwrap();
        let manifest = serde_json::json!({
            "manifest_version": "offline-snapshot.v1",
            "snapshot_id": "ecfr-2026-06-01",
            "created_at": "2026-06-01T00:00:00Z",
            "source": {
                "owner": "export-admin", "upstream": "https://www.ecfr.gov/",
                "approved_by": "compliance", "approved_at": "2026-06-02T00:00:00Z"
            },
            "scope": {"titles": ["15"], "parts": ["736"]},
            "payload": {
                "path": "snapshot.jsonl",
                "sha256": governance::sha256_hex(payload.as_bytes()),
                "size_bytes": payload.len()
            }
        });
        std::fs::write(
            dir.path().join("manifest.json"),
            serde_json::to_vec(&manifest).unwrap(),
        )
        .unwrap();
        let snapshot = validate_snapshot(dir.path()).unwrap();
        let corpus = build_corpus(&snapshot, &CorpusConfig::default()).unwrap();
        let sidecar_snapshot = SidecarSnapshot {
            snapshot_id: snapshot.manifest.snapshot_id.clone(),
            snapshot_sha256: snapshot.payload_sha256.clone(),
        };
        (corpus, sidecar_snapshot)
    }

    #[test]
    fn build_write_load_search() {
        let (corpus, snap) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let embedder = HashEmbedder::default();
        let index = VectorIndex::build(&corpus, snap, &embedder, "2000-01-01T00:00:00Z");
        index.write(dir.path()).unwrap();

        let loaded = VectorIndex::load(dir.path(), &corpus.manifest, &embedder).unwrap();
        assert_eq!(loaded.len(), 3);

        let hits = loaded
            .search(&embedder, "license review policy for the entity list", 2)
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].doc_id, "EAR-744.1");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn stale_corpus_fails_closed() {
        let (corpus, snap) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let embedder = HashEmbedder::default();
        VectorIndex::build(&corpus, snap, &embedder, "2000-01-01T00:00:00Z")
            .write(dir.path())
            .unwrap();

        let mut other = corpus.manifest.clone();
        other.corpus_digest = "f".repeat(64);
        assert!(matches!(
            VectorIndex::load(dir.path(), &other, &embedder).unwrap_err(),
            IndexError::Stale(_)
        ));
    }

    #[test]
    fn model_mismatch_fails_closed() {
        let (corpus, snap) = fixture();
        let dir = tempfile::tempdir().unwrap();
        VectorIndex::build(&corpus, snap, &HashEmbedder::default(), "2000-01-01T00:00:00Z")
            .write(dir.path())
            .unwrap();
        assert!(matches!(
            VectorIndex::load(dir.path(), &corpus.manifest, &HashEmbedder::new(128)).unwrap_err(),
            IndexError::Stale(_)
        ));
    }

    #[test]
    fn rebuild_is_deterministic() {
        let (corpus, snap) = fixture();
        let embedder = HashEmbedder::default();
        let a = VectorIndex::build(&corpus, snap.clone(), &embedder, "2000-01-01T00:00:00Z");
        let b = VectorIndex::build(&corpus, snap, &embedder, "2000-01-01T00:00:00Z");
        assert_eq!(
            serde_json::to_vec(&a.entries).unwrap(),
            serde_json::to_vec(&b.entries).unwrap()
        );
        assert_eq!(a.sidecar, b.sidecar);
    }
}
