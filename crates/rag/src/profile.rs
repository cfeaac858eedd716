//! Retrieval gating profiles.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Thin-retrieval thresholds.
///
/// The refusal gate itself is not a field on purpose: there is no switch
/// that turns it off. `REFUSE_ON_THIN_RETRIEVAL=0` in the environment is
/// ignored with a warning, and `min_docs` is clamped to at least 1, so the
/// weakest expressible profile still refuses on empty retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalProfile {
    pub min_docs: usize,
    pub min_top_score: f32,
    pub min_total_chars: usize,
    /// Anchored child documents count toward `min_docs`; they are
    /// retrieval documents in their own right.
    pub count_anchored_docs: bool,
}

impl Default for RetrievalProfile {
    fn default() -> Self {
        Self {
            min_docs: 1,
            min_top_score: 0.5,
            min_total_chars: 0,
            count_anchored_docs: true,
        }
    }
}

impl RetrievalProfile {
    pub fn new(min_docs: usize, min_top_score: f32, min_total_chars: usize) -> Self {
        Self {
            min_docs: min_docs.max(1),
            min_top_score,
            min_total_chars,
            count_anchored_docs: true,
        }
    }

    /// Read the threshold knobs from the environment, on top of defaults.
    /// The refusal gate cannot be disabled from here.
    pub fn from_env() -> Self {
        if matches!(
            std::env::var("REFUSE_ON_THIN_RETRIEVAL").as_deref(),
            Ok("0") | Ok("false")
        ) {
            warn!("REFUSE_ON_THIN_RETRIEVAL=0 ignored: the refusal gate is not configurable");
        }
        let mut profile = Self::default();
        if let Some(v) = env_parse::<usize>("THIN_RETRIEVAL_MIN_DOCS") {
            profile.min_docs = v.max(1);
        }
        if let Some(v) = env_parse::<f32>("THIN_RETRIEVAL_MIN_TOP_SCORE") {
            profile.min_top_score = v;
        }
        if let Some(v) = env_parse::<usize>("THIN_RETRIEVAL_MIN_TOTAL_CHARS") {
            profile.min_total_chars = v;
        }
        profile
    }

    /// Stable fingerprint for the answer-cache key.
    pub fn fingerprint(&self) -> String {
        format!(
            "docs={};score={:.4};chars={};anchored={}",
            self.min_docs, self.min_top_score, self.min_total_chars, self.count_anchored_docs
        )
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_docs_clamped_to_one() {
        let profile = RetrievalProfile::new(0, 0.0, 0);
        assert_eq!(profile.min_docs, 1);
    }

    #[test]
    fn fingerprint_distinguishes_profiles() {
        let a = RetrievalProfile::new(1, 0.5, 0);
        let b = RetrievalProfile::new(2, 0.5, 0);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
    }
}
