//! The RAG pipeline: retrieve → gate → expand → generate → verify.

use std::sync::Arc;

use corpus::Corpus;
use index::{Embedder, SearchHit, VectorIndex};
use kg::SparqlClient;
use tracing::{info, warn};

use crate::answer::{AnswerLabel, Citation, RagAnswer};
use crate::cache::{answer_cache_key, AnswerCache};
use crate::error::RagError;
use crate::expand::expand_citations;
use crate::generate::{GenPrompt, TextGenerator};
use crate::profile::RetrievalProfile;
use crate::prompt::{assemble_prompt, PromptBudget};

#[derive(Debug, Clone)]
pub struct RagRequest {
    pub question: String,
    pub top_k: usize,
}

pub struct RagPipeline {
    index: Arc<VectorIndex>,
    corpus: Arc<Corpus>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn TextGenerator>,
    profile: RetrievalProfile,
    budget: PromptBudget,
    kg: Option<(Arc<SparqlClient>, String)>,
    cache: AnswerCache,
    kg_digest: String,
    sidecar_hash: String,
}

impl RagPipeline {
    pub fn new(
        index: Arc<VectorIndex>,
        corpus: Arc<Corpus>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn TextGenerator>,
        profile: RetrievalProfile,
        kg_digest: impl Into<String>,
    ) -> Result<Self, RagError> {
        let sidecar_hash = index.sidecar().content_hash()?;
        Ok(Self {
            index,
            corpus,
            embedder,
            generator,
            profile,
            budget: PromptBudget::default(),
            kg: None,
            cache: AnswerCache::new(256),
            kg_digest: kg_digest.into(),
            sidecar_hash,
        })
    }

    /// Enable KG expansion against a snapshot graph.
    pub fn with_kg(mut self, client: Arc<SparqlClient>, graph_iri: impl Into<String>) -> Self {
        self.kg = Some((client, graph_iri.into()));
        self
    }

    pub fn with_budget(mut self, budget: PromptBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn profile(&self) -> &RetrievalProfile {
        &self.profile
    }

    /// Answer a question, serving from the cache when the full provenance
    /// chain matches. Concurrent duplicates share one materialization.
    pub async fn query(&self, request: &RagRequest) -> Result<Arc<RagAnswer>, RagError> {
        let key = answer_cache_key(
            &request.question,
            &self.kg_digest,
            &self.sidecar_hash,
            self.generator.model_id(),
            request.top_k,
            &self.profile,
        );
        self.cache
            .get_or_build(key, || self.materialize(request))
            .await
    }

    async fn materialize(&self, request: &RagRequest) -> Result<RagAnswer, RagError> {
        let hits = self
            .index
            .search(self.embedder.as_ref(), &request.question, request.top_k)?;

        if let Some(refusal) = self.thin_gate(&hits) {
            info!(question_chars = request.question.len(), "query_refused");
            return Ok(refusal);
        }

        let kg_context = match &self.kg {
            Some((client, graph)) => {
                let mut section_ids: Vec<String> =
                    hits.iter().map(|h| h.section_id.clone()).collect();
                section_ids.dedup();
                expand_citations(client, graph, &section_ids).await
            }
            None => Vec::new(),
        };

        let (prompt, included) = assemble_prompt(&request.question, &hits, &kg_context, &self.budget);
        let draft = self
            .generator
            .generate(&GenPrompt {
                prompt,
                context_doc_ids: included,
                question: request.question.clone(),
            })
            .await?;

        let label = AnswerLabel::parse(&draft.label)?;
        let (citations, dropped) = self.ground_citations(&draft.citations, &hits);
        let grounded = !citations.is_empty() && dropped.is_empty();

        let mut rationale = draft.rationale;
        if !dropped.is_empty() {
            warn!(dropped = ?dropped, "ungrounded_citations_dropped");
            rationale.push_str(&format!(" [dropped ungrounded citations: {}]", dropped.join(", ")));
        }

        info!(label = ?label, citations = citations.len(), grounded, "query_answered");
        Ok(RagAnswer {
            label,
            answer: draft.answer,
            citations,
            rationale,
            refusal_reason: None,
            grounded,
        })
    }

    // The non-bypassable gate. Anchored children count per the profile
    // decision; the refusal carries the measured numbers for the audit
    // trail.
    fn thin_gate(&self, hits: &[SearchHit]) -> Option<RagAnswer> {
        let counted = if self.profile.count_anchored_docs {
            hits.len()
        } else {
            hits.iter()
                .filter(|h| ident::split_doc_id(&h.doc_id).1.is_none())
                .count()
        };
        let top_score = hits.first().map(|h| h.score).unwrap_or(0.0);
        let total_chars: usize = hits.iter().map(|h| h.text.len()).sum();

        let thin = counted < self.profile.min_docs
            || top_score < self.profile.min_top_score
            || total_chars < self.profile.min_total_chars;
        if thin {
            Some(RagAnswer::refusal(
                "thin_retrieval",
                format!(
                    "retrieval below profile: docs={counted} (min {}), top_score={top_score:.3} (min {:.3}), total_chars={total_chars} (min {})",
                    self.profile.min_docs, self.profile.min_top_score, self.profile.min_total_chars
                ),
            ))
        } else {
            None
        }
    }

    // Citations must resolve to exactly one corpus document by section id;
    // anchored ids are collapsed to their parent section. Returns
    // (grounded citations, dropped raw ids).
    fn ground_citations(
        &self,
        raw: &[String],
        hits: &[SearchHit],
    ) -> (Vec<Citation>, Vec<String>) {
        let mut citations: Vec<Citation> = Vec::new();
        let mut dropped = Vec::new();
        for cited in raw {
            let section_id = match ident::normalize_doc_id(cited) {
                Ok(normalized) => ident::split_doc_id(&normalized).0.to_string(),
                Err(_) => {
                    dropped.push(cited.clone());
                    continue;
                }
            };
            if self.corpus.doc_by_id(&section_id).is_none() {
                dropped.push(cited.clone());
                continue;
            }
            if citations.iter().any(|c| c.section_id == section_id) {
                continue;
            }
            let score = hits
                .iter()
                .filter(|h| h.section_id == section_id)
                .map(|h| h.score)
                .fold(0.0f32, f32::max);
            citations.push(Citation { section_id, score });
        }
        (citations, dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::{GenOutput, StaticGenerator};
    use async_trait::async_trait;
    use corpus::{build_corpus, validate_snapshot, CorpusConfig};
    use index::{HashEmbedder, SidecarSnapshot};

    fn fixture_pipeline(
        profile: RetrievalProfile,
        generator: Arc<dyn TextGenerator>,
    ) -> RagPipeline {
        let dir = tempfile::tempdir().unwrap();
        let payload = concat!(
            "{\"section_id\":\"EAR-736.2\",\"text\":\"General prohibitions on exports without a license from the bureau.\"}\n",
            "{\"section_id\":\"EAR-744.1\",\"text\":\"Entity list scope and license review policy for listed parties.\"}\n",
            "{\"section_id\":\"EAR-772.1\",\"text\":\"Definitions of terms used throughout the regulations.\"}\n",
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
        let corpus = Arc::new(build_corpus(&snapshot, &CorpusConfig::default()).unwrap());
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::default());
        let index = Arc::new(VectorIndex::build(
            &corpus,
            SidecarSnapshot {
                snapshot_id: "ecfr-2026-06-01".to_string(),
                snapshot_sha256: snapshot.payload_sha256.clone(),
            },
            embedder.as_ref(),
            "2000-01-01T00:00:00Z",
        ));
        RagPipeline::new(index, corpus, embedder, generator, profile, "kgdigest").unwrap()
    }

    #[tokio::test]
    async fn unrelated_query_refuses_with_thin_retrieval() {
        let pipeline = fixture_pipeline(
            RetrievalProfile::new(1, 0.9, 0),
            Arc::new(StaticGenerator::default()),
        );
        let answer = pipeline
            .query(&RagRequest {
                question: "unrelated string".to_string(),
                top_k: 3,
            })
            .await
            .unwrap();
        assert_eq!(answer.refusal_reason.as_deref(), Some("thin_retrieval"));
        assert!(answer.citations.is_empty());
        assert!(!answer.grounded);
        assert_eq!(answer.label, AnswerLabel::Unanswerable);
    }

    #[tokio::test]
    async fn on_topic_query_answers_with_grounded_citations() {
        let pipeline = fixture_pipeline(
            RetrievalProfile::new(1, 0.3, 0),
            Arc::new(StaticGenerator::new(
                "license_required",
                "A license is required for listed parties.",
            )),
        );
        let answer = pipeline
            .query(&RagRequest {
                question: "license review policy for the entity list".to_string(),
                top_k: 2,
            })
            .await
            .unwrap();
        assert_eq!(answer.label, AnswerLabel::LicenseRequired);
        assert!(answer.grounded);
        assert!(!answer.citations.is_empty());
        assert!(answer
            .citations
            .iter()
            .all(|c| !c.section_id.contains('#')));
        assert!(answer
            .citations
            .iter()
            .any(|c| c.section_id == "EAR-744.1"));
    }

    struct HallucinatingGenerator;

    #[async_trait]
    impl TextGenerator for HallucinatingGenerator {
        fn model_id(&self) -> &str {
            "hallucinate.v1"
        }
        async fn generate(&self, prompt: &GenPrompt) -> Result<GenOutput, RagError> {
            let mut citations = prompt.context_doc_ids.clone();
            citations.push("EAR-999.9".to_string());
            citations.push("not an id".to_string());
            Ok(GenOutput {
                label: "permitted".to_string(),
                answer: "Permitted.".to_string(),
                rationale: "r".to_string(),
                citations,
            })
        }
    }

    #[tokio::test]
    async fn ungrounded_citations_dropped_and_flagged() {
        let pipeline = fixture_pipeline(
            RetrievalProfile::new(1, 0.3, 0),
            Arc::new(HallucinatingGenerator),
        );
        let answer = pipeline
            .query(&RagRequest {
                question: "general prohibitions on exports without a license".to_string(),
                top_k: 2,
            })
            .await
            .unwrap();
        assert!(!answer.grounded);
        assert!(answer
            .citations
            .iter()
            .all(|c| c.section_id != "EAR-999.9"));
        assert!(answer.rationale.contains("dropped ungrounded"));
    }

    struct BadLabelGenerator;

    #[async_trait]
    impl TextGenerator for BadLabelGenerator {
        fn model_id(&self) -> &str {
            "bad.v1"
        }
        async fn generate(&self, _prompt: &GenPrompt) -> Result<GenOutput, RagError> {
            Ok(GenOutput {
                label: "definitely_fine".to_string(),
                answer: "a".to_string(),
                rationale: "r".to_string(),
                citations: vec![],
            })
        }
    }

    #[tokio::test]
    async fn invalid_label_is_an_error_not_a_passthrough() {
        let pipeline = fixture_pipeline(
            RetrievalProfile::new(1, 0.3, 0),
            Arc::new(BadLabelGenerator),
        );
        let err = pipeline
            .query(&RagRequest {
                question: "general prohibitions on exports".to_string(),
                top_k: 2,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::ContractViolation(_)));
    }

    // Anchored children count toward min_docs: with a corpus of one
    // chunked section (parent + two children) and min_docs = 3, the gate
    // passes only because the children are counted.
    #[tokio::test]
    async fn anchored_children_count_toward_min_docs() {
        let dir = tempfile::tempdir().unwrap();
        let long = format!(
            "{} license export control\n\n{} license export control",
            "alpha ".repeat(30).trim(),
            "beta ".repeat(30).trim()
        );
        let payload = format!(
            "{}\n",
            serde_json::json!({ "section_id": "EAR-736.2", "text": long })
        );
        std::fs::write(dir.path().join("snapshot.jsonl"), &payload).unwrap();
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
        let corpus = Arc::new(
            build_corpus(&snapshot, &corpus::CorpusConfig { max_tokens: 40 }).unwrap(),
        );
        assert_eq!(corpus.docs.len(), 3, "parent + two anchored children");

        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::default());
        let index = Arc::new(VectorIndex::build(
            &corpus,
            index::SidecarSnapshot {
                snapshot_id: "ecfr-2026-06-01".to_string(),
                snapshot_sha256: snapshot.payload_sha256.clone(),
            },
            embedder.as_ref(),
            "2000-01-01T00:00:00Z",
        ));
        let pipeline = RagPipeline::new(
            index,
            corpus,
            embedder,
            Arc::new(StaticGenerator::new("permitted", "Permitted.")),
            RetrievalProfile {
                min_docs: 3,
                min_top_score: 0.0,
                min_total_chars: 0,
                count_anchored_docs: true,
            },
            "kgdigest",
        )
        .unwrap();

        let answer = pipeline
            .query(&RagRequest {
                question: "license export control".to_string(),
                top_k: 5,
            })
            .await
            .unwrap();
        assert!(answer.refusal_reason.is_none());
    }

    #[tokio::test]
    async fn repeat_query_served_from_cache() {
        let pipeline = fixture_pipeline(
            RetrievalProfile::new(1, 0.3, 0),
            Arc::new(StaticGenerator::new("permitted", "Permitted.")),
        );
        let request = RagRequest {
            question: "definitions of terms used in the regulations".to_string(),
            top_k: 2,
        };
        let first = pipeline.query(&request).await.unwrap();
        let second = pipeline.query(&request).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
