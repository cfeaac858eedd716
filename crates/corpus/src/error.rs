use std::path::PathBuf;

use thiserror::Error;

/// Corpus-building failures, split along the pipeline error taxonomy:
/// malformed input, integrity mismatches, and duplicate identity conflicts
/// are distinct kinds so the orchestrator can map exit codes precisely.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot manifest invalid: {0}")]
    InvalidManifest(String),

    #[error("snapshot payload invalid at line {line}: {reason}")]
    InvalidPayload { line: usize, reason: String },

    #[error("snapshot payload hash mismatch: manifest {expected}, file {actual}")]
    PayloadHashMismatch { expected: String, actual: String },

    #[error("snapshot payload size mismatch: manifest {expected}, file {actual}")]
    PayloadSizeMismatch { expected: u64, actual: u64 },

    #[error("duplicate doc id {0}")]
    DuplicateDocId(String),

    #[error("invalid identifier: {0}")]
    Id(#[from] ident::IdError),

    #[error("corpus invalid: {0}")]
    InvalidCorpus(String),

    #[error("corpus digest mismatch: manifest {expected}, recomputed {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CorpusError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CorpusError::Io {
            path: path.into(),
            source,
        }
    }

    /// Integrity-class errors abort the run and must not produce artifacts.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            CorpusError::PayloadHashMismatch { .. }
                | CorpusError::PayloadSizeMismatch { .. }
                | CorpusError::DigestMismatch { .. }
        )
    }
}
