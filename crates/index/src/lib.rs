//! # EarCrawler Retrieval Index
//!
//! A dense vector index over retrieval documents, paired with a provenance
//! sidecar that binds the index to exactly one corpus digest and one named
//! embedding model.
//!
//! ## Core Guarantee
//!
//! > **An index is a cache, never a source of truth.**
//!
//! The pair (index, sidecar) is recomputable from (corpus, embedding
//! model); the loader fails closed on any mismatch between the sidecar and
//! the active corpus, so a stale index can never silently answer queries
//! against the wrong snapshot.
//!
//! ## Embedding
//!
//! [`Embedder`] is the seam for real models. The in-tree default,
//! [`HashEmbedder`], derives a deterministic pseudo-embedding from token
//! hashes: cheap, offline, reproducible across platforms, and good enough
//! to exercise ranking, thresholds, and refusal behavior in CI. Scores are
//! cosine similarity over L2-normalized vectors.

mod embed;
mod error;
mod sidecar;
mod store;

pub use crate::embed::{Embedder, HashEmbedder};
pub use crate::error::IndexError;
pub use crate::sidecar::{IndexSidecar, SidecarSnapshot, SIDECAR_FILE};
pub use crate::store::{SearchHit, VectorIndex, INDEX_FILE};
