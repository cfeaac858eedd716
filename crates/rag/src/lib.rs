//! EarCrawler RAG Layer - Grounded Answers or Refusal
//!
//! The pipeline retrieves top-K documents from the vector index, optionally
//! expands context through the knowledge graph (allowlisted templates
//! only), assembles a token-budgeted prompt, calls a pluggable text
//! generator, and enforces the strict output contract on whatever comes
//! back.
//!
//! # The strict output contract
//!
//! Not bypassable by configuration:
//! - Thin retrieval (below the active profile's `min_docs`,
//!   `min_top_score`, `min_total_chars`) MUST refuse with
//!   `refusal_reason = "thin_retrieval"` and empty citations.
//! - Every citation must be a canonical section id resolving to exactly
//!   one retrieval document; ungrounded citations are dropped and flagged.
//! - `label` is a closed enum; anything else from the generator is an
//!   error, never passed through.
//!
//! # Answer cache
//!
//! Answers are cached under a key derived from the normalized question and
//! the full provenance chain (KG digest, index sidecar hash, model id,
//! top_k, profile). Any component change invalidates naturally. Builds are
//! single-flight per key: concurrent duplicates await the one in-flight
//! materialization.

mod answer;
mod cache;
mod error;
mod expand;
mod generate;
mod pipeline;
mod profile;
mod prompt;

pub use crate::answer::{AnswerLabel, Citation, RagAnswer};
pub use crate::cache::{answer_cache_key, AnswerCache};
pub use crate::error::RagError;
pub use crate::expand::{expand_citations, KgContext};
pub use crate::generate::{GenOutput, GenPrompt, StaticGenerator, TextGenerator};
pub use crate::pipeline::{RagPipeline, RagRequest};
pub use crate::profile::RetrievalProfile;
pub use crate::prompt::{assemble_prompt, PromptBudget};
