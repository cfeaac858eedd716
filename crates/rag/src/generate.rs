//! The pluggable text-generation seam.
//!
//! Remote LLM SDKs live outside this repository; what the pipeline needs is
//! a capability that turns a prompt into a structured draft. The draft is
//! untrusted: the pipeline re-validates its label and citations before
//! anything reaches a caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RagError;

/// What the generator sees: the rendered prompt plus the ids of the
/// documents that made it into context.
#[derive(Debug, Clone)]
pub struct GenPrompt {
    pub prompt: String,
    pub context_doc_ids: Vec<String>,
    pub question: String,
}

/// The generator's structured draft. `label` and `citations` are claims to
/// be verified, not facts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenOutput {
    pub label: String,
    pub answer: String,
    pub rationale: String,
    #[serde(default)]
    pub citations: Vec<String>,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Stable model identifier; part of the answer-cache key.
    fn model_id(&self) -> &str;

    async fn generate(&self, prompt: &GenPrompt) -> Result<GenOutput, RagError>;
}

/// Deterministic offline generator for CI and fixtures: answers with a
/// fixed label and cites every context document.
pub struct StaticGenerator {
    label: String,
    answer: String,
}

impl StaticGenerator {
    pub fn new(label: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            answer: answer.into(),
        }
    }
}

impl Default for StaticGenerator {
    fn default() -> Self {
        Self::new("unanswerable", "Insufficient basis to answer from context.")
    }
}

#[async_trait]
impl TextGenerator for StaticGenerator {
    fn model_id(&self) -> &str {
        "static.v1"
    }

    async fn generate(&self, prompt: &GenPrompt) -> Result<GenOutput, RagError> {
        Ok(GenOutput {
            label: self.label.clone(),
            answer: self.answer.clone(),
            rationale: format!(
                "static draft over {} context documents",
                prompt.context_doc_ids.len()
            ),
            citations: prompt.context_doc_ids.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_generator_cites_context() {
        let generator = StaticGenerator::new("license_required", "A license is required.");
        let output = generator
            .generate(&GenPrompt {
                prompt: "p".to_string(),
                context_doc_ids: vec!["EAR-736.2".to_string(), "EAR-744.1".to_string()],
                question: "q".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(output.label, "license_required");
        assert_eq!(output.citations.len(), 2);
    }
}
