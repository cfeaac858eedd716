//! EarCrawler Corpus Layer - Deterministic Retrieval-Corpus Building
//!
//! This crate turns an approved offline eCFR snapshot into a canonical
//! retrieval corpus: one JSONL file with sorted keys and sorted records, a
//! manifest binding the corpus digest, and a checksum file over every
//! emitted artifact.
//!
//! # Core Guarantee
//!
//! > **Same snapshot bytes + same `CorpusConfig` → byte-identical corpus,
//! > forever, on every platform.**
//!
//! Everything downstream hangs off this: the KG `inputs_hash`, the index
//! sidecar binding, and the RAG answer-cache key all embed the
//! `corpus_digest`, so a single nondeterministic byte here would poison
//! provenance for the whole pipeline. The build is therefore pure: no
//! wall-clock, no locale, no map-iteration order anywhere near the output.
//!
//! # Pipeline Position
//!
//! ```text
//! Offline Snapshot ──▶ Corpus ──▶ KG Emitter ──▶ Integrity Gate ──▶ Index ──▶ RAG
//!                        ↑
//!                    (this crate)
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use corpus::{build_corpus, validate_snapshot, write_corpus, CorpusConfig};
//!
//! # fn main() -> Result<(), corpus::CorpusError> {
//! let snapshot = validate_snapshot("snapshots/2026-06-01".as_ref())?;
//! let corpus = build_corpus(&snapshot, &CorpusConfig::default())?;
//! write_corpus(&corpus, "out/corpus".as_ref())?;
//! # Ok(())
//! # }
//! ```

mod builder;
mod chunk;
mod doc;
mod error;
mod snapshot;

pub use crate::builder::{
    build_corpus, load_corpus, validate_corpus, write_corpus, Corpus, CorpusConfig,
    CHECKSUMS_FILE, CORPUS_FILE, MANIFEST_FILE,
};
pub use crate::chunk::{estimate_tokens, split_paragraphs};
pub use crate::doc::{ChunkKind, CorpusManifest, RetrievalDoc, SourceKind, RETRIEVAL_SCHEMA_VERSION};
pub use crate::error::CorpusError;
pub use crate::snapshot::{
    validate_snapshot, OfflineSnapshotManifest, SnapshotPayload, SnapshotRecord, SnapshotScope,
    SnapshotSource, ValidatedSnapshot, OFFLINE_MANIFEST_VERSION,
};
