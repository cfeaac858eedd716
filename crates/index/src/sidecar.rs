//! The index sidecar - the provenance half of the (index, sidecar) pair.

use std::path::Path;

use governance::canonical_json_bytes;
use serde::{Deserialize, Serialize};

use crate::error::IndexError;

pub const SIDECAR_FILE: &str = "index.sidecar.json";

/// Snapshot identity carried through from the offline snapshot manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidecarSnapshot {
    pub snapshot_id: String,
    pub snapshot_sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSidecar {
    /// Digest of the corpus the vectors were computed from.
    pub corpus_digest: String,
    /// Embedder identity; vectors from different models never mix.
    pub embedding_model: String,
    /// From `SOURCE_DATE_EPOCH` at build time.
    pub built_at: String,
    pub doc_count: usize,
    pub snapshot: SidecarSnapshot,
}

impl IndexSidecar {
    pub fn write(&self, dir: &Path) -> Result<(), IndexError> {
        std::fs::create_dir_all(dir)?;
        let mut bytes = canonical_json_bytes(self)?;
        bytes.push(b'\n');
        std::fs::write(dir.join(SIDECAR_FILE), bytes)?;
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self, IndexError> {
        let path = dir.join(SIDECAR_FILE);
        let bytes = std::fs::read(&path)
            .map_err(|_| IndexError::SidecarMissing(path.display().to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Content hash of the sidecar itself; part of the RAG answer-cache key.
    pub fn content_hash(&self) -> Result<String, IndexError> {
        Ok(governance::sha256_hex(&canonical_json_bytes(self)?))
    }
}
