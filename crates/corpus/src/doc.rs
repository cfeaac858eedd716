//! Retrieval-corpus record types.

use serde::{Deserialize, Serialize};

/// Schema version stamped into every retrieval document.
pub const RETRIEVAL_SCHEMA_VERSION: &str = "retrieval-corpus.v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Section,
    Subsection,
    Paragraph,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    EcfrSnapshot,
    EcfrApi,
    Other,
}

/// One retrieval document.
///
/// Unknown fields in stored corpora are ignored on read and never
/// re-emitted; the canonical writer serializes exactly this shape with
/// sorted keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalDoc {
    pub schema_version: String,
    /// Unique canonical id: a section id, or `<section_id>#pNNNN` for
    /// chunked children.
    pub doc_id: String,
    pub section_id: String,
    pub text: String,
    pub chunk_kind: ChunkKind,
    pub source: SourceKind,
    /// Snapshot identity string binding the document to its input.
    pub source_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Must resolve to another doc in the same corpus when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_estimate: Option<u32>,
    /// SHA-256 of `text`, for spot integrity checks on large corpora.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Corpus-level manifest written beside the JSONL file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusManifest {
    pub schema_version: String,
    pub source_ref: String,
    pub doc_count: usize,
    /// SHA-256 over the canonical corpus bytes; the corpus identity.
    pub corpus_digest: String,
}
