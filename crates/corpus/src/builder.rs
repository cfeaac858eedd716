//! Corpus building, canonical serialization, and validation.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use governance::{canonical_json_bytes, sha256_hex};
use tracing::info;
use unicode_normalization::UnicodeNormalization;

use crate::chunk::{estimate_tokens, split_paragraphs};
use crate::doc::{ChunkKind, CorpusManifest, RetrievalDoc, SourceKind, RETRIEVAL_SCHEMA_VERSION};
use crate::error::CorpusError;
use crate::snapshot::ValidatedSnapshot;

/// Canonical corpus file name.
pub const CORPUS_FILE: &str = "retrieval_corpus.jsonl";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const CHECKSUMS_FILE: &str = "checksums.sha256";

/// Builder configuration. All fields are enumerated; there is no
/// keyword-bag escape hatch.
#[derive(Debug, Clone)]
pub struct CorpusConfig {
    /// Sections whose token estimate exceeds this are chunked.
    pub max_tokens: u32,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self { max_tokens: 400 }
    }
}

/// An in-memory corpus: documents in canonical `doc_id` order plus the
/// manifest whose digest is bound to the canonical serialization.
#[derive(Debug, Clone)]
pub struct Corpus {
    pub docs: Vec<RetrievalDoc>,
    pub manifest: CorpusManifest,
}

impl Corpus {
    /// Canonical JSONL bytes: sorted keys, records sorted by `doc_id`,
    /// LF-only, trailing newline.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, CorpusError> {
        canonical_corpus_bytes(&self.docs)
    }

    pub fn doc_by_id(&self, doc_id: &str) -> Option<&RetrievalDoc> {
        self.docs
            .binary_search_by(|d| d.doc_id.as_str().cmp(doc_id))
            .ok()
            .map(|i| &self.docs[i])
    }
}

fn canonical_corpus_bytes(docs: &[RetrievalDoc]) -> Result<Vec<u8>, CorpusError> {
    let mut out = Vec::new();
    for doc in docs {
        out.extend_from_slice(&canonical_json_bytes(doc)?);
        out.push(b'\n');
    }
    Ok(out)
}

/// Build a corpus from a validated snapshot.
///
/// Deterministic by construction: records are keyed and emitted through a
/// `BTreeMap`, text is NFKC-normalized with a locale-free rule set, and the
/// chunker never consults anything but its inputs.
pub fn build_corpus(
    snapshot: &ValidatedSnapshot,
    cfg: &CorpusConfig,
) -> Result<Corpus, CorpusError> {
    let source_ref = snapshot.manifest.snapshot_id.clone();
    let mut docs: BTreeMap<String, RetrievalDoc> = BTreeMap::new();

    for record in &snapshot.records {
        let section_id = ident::normalize_section_id(&record.section_id)?;
        let text: String = record.text.nfkc().collect::<String>().trim().to_string();
        let tokens = estimate_tokens(&text);

        let parent = RetrievalDoc {
            schema_version: RETRIEVAL_SCHEMA_VERSION.to_string(),
            doc_id: section_id.clone(),
            section_id: section_id.clone(),
            text: text.clone(),
            chunk_kind: ChunkKind::Section,
            source: SourceKind::EcfrSnapshot,
            source_ref: source_ref.clone(),
            title: record.title.clone(),
            url: record.url.clone(),
            parent_id: None,
            ordinal: None,
            tokens_estimate: Some(tokens),
            hash: Some(sha256_hex(text.as_bytes())),
        };
        if docs.insert(section_id.clone(), parent).is_some() {
            return Err(CorpusError::DuplicateDocId(section_id));
        }

        if tokens > cfg.max_tokens {
            for (idx, chunk) in split_paragraphs(&text, cfg.max_tokens).into_iter().enumerate() {
                let ordinal = (idx + 1) as u32;
                let doc_id = format!("{section_id}#p{ordinal:04}");
                let child = RetrievalDoc {
                    schema_version: RETRIEVAL_SCHEMA_VERSION.to_string(),
                    doc_id: doc_id.clone(),
                    section_id: section_id.clone(),
                    tokens_estimate: Some(estimate_tokens(&chunk)),
                    hash: Some(sha256_hex(chunk.as_bytes())),
                    text: chunk,
                    chunk_kind: ChunkKind::Paragraph,
                    source: SourceKind::EcfrSnapshot,
                    source_ref: source_ref.clone(),
                    title: None,
                    url: None,
                    parent_id: Some(section_id.clone()),
                    ordinal: Some(ordinal),
                };
                if docs.insert(doc_id.clone(), child).is_some() {
                    return Err(CorpusError::DuplicateDocId(doc_id));
                }
            }
        }
    }

    let docs: Vec<RetrievalDoc> = docs.into_values().collect();
    let bytes = canonical_corpus_bytes(&docs)?;
    let corpus_digest = sha256_hex(&bytes);
    info!(
        source_ref = %source_ref,
        doc_count = docs.len(),
        corpus_digest = %corpus_digest,
        "corpus_built"
    );
    Ok(Corpus {
        manifest: CorpusManifest {
            schema_version: RETRIEVAL_SCHEMA_VERSION.to_string(),
            source_ref,
            doc_count: docs.len(),
            corpus_digest,
        },
        docs,
    })
}

/// Write the corpus, its manifest, and `checksums.sha256` into `dir`.
pub fn write_corpus(corpus: &Corpus, dir: &Path) -> Result<(), CorpusError> {
    fs::create_dir_all(dir).map_err(|e| CorpusError::io(dir, e))?;

    let corpus_bytes = corpus.canonical_bytes()?;
    let corpus_path = dir.join(CORPUS_FILE);
    fs::write(&corpus_path, &corpus_bytes).map_err(|e| CorpusError::io(&corpus_path, e))?;

    let mut manifest_bytes = canonical_json_bytes(&corpus.manifest)?;
    manifest_bytes.push(b'\n');
    let manifest_path = dir.join(MANIFEST_FILE);
    fs::write(&manifest_path, &manifest_bytes).map_err(|e| CorpusError::io(&manifest_path, e))?;

    // sha256sum-compatible lines, sorted by file name.
    let checksums = format!(
        "{}  {}\n{}  {}\n",
        sha256_hex(&manifest_bytes),
        MANIFEST_FILE,
        sha256_hex(&corpus_bytes),
        CORPUS_FILE,
    );
    let checksums_path = dir.join(CHECKSUMS_FILE);
    fs::write(&checksums_path, checksums).map_err(|e| CorpusError::io(&checksums_path, e))?;
    Ok(())
}

/// Load a corpus directory back into memory. Unknown record fields are
/// ignored; validation is a separate, stricter pass.
pub fn load_corpus(dir: &Path) -> Result<Corpus, CorpusError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let manifest_bytes =
        fs::read(&manifest_path).map_err(|e| CorpusError::io(&manifest_path, e))?;
    let manifest: CorpusManifest = serde_json::from_slice(&manifest_bytes)?;

    let corpus_path = dir.join(CORPUS_FILE);
    let corpus_text =
        fs::read_to_string(&corpus_path).map_err(|e| CorpusError::io(&corpus_path, e))?;
    let mut docs = Vec::new();
    for line in corpus_text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        docs.push(serde_json::from_str::<RetrievalDoc>(line)?);
    }
    Ok(Corpus { docs, manifest })
}

/// Validate a corpus directory against the canonical contract.
///
/// Checks: digest binding (manifest vs recomputed bytes vs checksum file),
/// record ordering and uniqueness, schema versions, non-empty text, parent
/// resolution, and byte-level canonicality of every line. With `strict`,
/// `paragraph` chunks must carry a resolvable `parent_id`.
pub fn validate_corpus(dir: &Path, strict: bool) -> Result<CorpusManifest, CorpusError> {
    let corpus = load_corpus(dir)?;
    let corpus_path = dir.join(CORPUS_FILE);
    let raw = fs::read(&corpus_path).map_err(|e| CorpusError::io(&corpus_path, e))?;

    let actual_digest = sha256_hex(&raw);
    if actual_digest != corpus.manifest.corpus_digest {
        return Err(CorpusError::DigestMismatch {
            expected: corpus.manifest.corpus_digest.clone(),
            actual: actual_digest,
        });
    }
    let canonical = corpus.canonical_bytes()?;
    if canonical != raw {
        return Err(CorpusError::InvalidCorpus(
            "stored bytes are not the canonical serialization".into(),
        ));
    }
    if corpus.manifest.doc_count != corpus.docs.len() {
        return Err(CorpusError::InvalidCorpus(format!(
            "manifest doc_count {} but file has {}",
            corpus.manifest.doc_count,
            corpus.docs.len()
        )));
    }

    let mut prev_id: Option<&str> = None;
    for doc in &corpus.docs {
        if doc.schema_version != RETRIEVAL_SCHEMA_VERSION {
            return Err(CorpusError::InvalidCorpus(format!(
                "doc {} has schema_version {:?}",
                doc.doc_id, doc.schema_version
            )));
        }
        if doc.text.trim().is_empty() {
            return Err(CorpusError::InvalidCorpus(format!(
                "doc {} has empty text",
                doc.doc_id
            )));
        }
        let normalized = ident::normalize_doc_id(&doc.doc_id)?;
        if normalized != doc.doc_id {
            return Err(CorpusError::InvalidCorpus(format!(
                "doc id {:?} is not canonical",
                doc.doc_id
            )));
        }
        if let Some(prev) = prev_id {
            match prev.cmp(doc.doc_id.as_str()) {
                std::cmp::Ordering::Less => {}
                std::cmp::Ordering::Equal => {
                    return Err(CorpusError::DuplicateDocId(doc.doc_id.clone()))
                }
                std::cmp::Ordering::Greater => {
                    return Err(CorpusError::InvalidCorpus(format!(
                        "doc {} out of order after {}",
                        doc.doc_id, prev
                    )))
                }
            }
        }
        prev_id = Some(doc.doc_id.as_str());

        if let Some(parent_id) = &doc.parent_id {
            if corpus.doc_by_id(parent_id).is_none() {
                return Err(CorpusError::InvalidCorpus(format!(
                    "doc {} parent {} unresolved",
                    doc.doc_id, parent_id
                )));
            }
        } else if strict && doc.chunk_kind == ChunkKind::Paragraph {
            return Err(CorpusError::InvalidCorpus(format!(
                "paragraph doc {} has no parent_id (strict)",
                doc.doc_id
            )));
        }
    }

    // The checksum file must agree with what is on disk.
    let checksums_path = dir.join(CHECKSUMS_FILE);
    let checksums =
        fs::read_to_string(&checksums_path).map_err(|e| CorpusError::io(&checksums_path, e))?;
    for line in checksums.lines() {
        let Some((digest, name)) = line.split_once("  ") else {
            return Err(CorpusError::InvalidCorpus(format!(
                "malformed checksum line {line:?}"
            )));
        };
        let file_path = dir.join(name);
        let bytes = fs::read(&file_path).map_err(|e| CorpusError::io(&file_path, e))?;
        let actual = sha256_hex(&bytes);
        if actual != digest {
            return Err(CorpusError::DigestMismatch {
                expected: digest.to_string(),
                actual,
            });
        }
    }

    Ok(corpus.manifest)
}
