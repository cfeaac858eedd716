//! Answer cache with per-key single-flight materialization.
//!
//! The key embeds the full provenance chain, so invalidation is free: a new
//! snapshot, index, model, or profile simply derives a different key. The
//! at-most-one-concurrent-build property holds per key; duplicate
//! concurrent queries await the in-flight result instead of re-running the
//! pipeline.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use dashmap::DashMap;
use governance::sha256_hex;
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::debug;

use crate::answer::RagAnswer;
use crate::error::RagError;
use crate::profile::RetrievalProfile;

/// Derive the cache key. The question is normalized (trim, collapse
/// whitespace, lowercase) so trivial rephrasings share an entry.
pub fn answer_cache_key(
    question: &str,
    kg_digest: &str,
    sidecar_hash: &str,
    model_id: &str,
    top_k: usize,
    profile: &RetrievalProfile,
) -> String {
    let normalized: String = question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let material = format!(
        "{normalized}\n{kg_digest}\n{sidecar_hash}\n{model_id}\n{top_k}\n{}",
        profile.fingerprint()
    );
    sha256_hex(material.as_bytes())
}

pub struct AnswerCache {
    entries: Mutex<LruCache<String, Arc<RagAnswer>>>,
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl AnswerCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("non-zero capacity");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            inflight: DashMap::new(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Arc<RagAnswer>> {
        self.entries.lock().await.get(key).cloned()
    }

    /// Return the cached answer or build it exactly once. Concurrent
    /// callers with the same key queue on the per-key gate and observe the
    /// winner's result. A failed build caches nothing; the next caller in
    /// the queue retries.
    pub async fn get_or_build<F, Fut>(&self, key: String, build: F) -> Result<Arc<RagAnswer>, RagError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RagAnswer, RagError>>,
    {
        if let Some(hit) = self.get(&key).await {
            debug!(key = %key, "answer_cache_hit");
            return Ok(hit);
        }

        let gate = self
            .inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = gate.lock().await;

        // A winner may have populated the cache while we queued.
        if let Some(hit) = self.get(&key).await {
            self.inflight.remove(&key);
            debug!(key = %key, "answer_cache_hit_after_wait");
            return Ok(hit);
        }

        // The gate entry must not outlive this build attempt: a failed
        // build that left it behind would grow the inflight map by one
        // entry per distinct failing key, forever.
        let result = build().await;
        self.inflight.remove(&key);
        match result {
            Ok(answer) => {
                let answer = Arc::new(answer);
                self.entries.lock().await.put(key, answer.clone());
                Ok(answer)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::AnswerLabel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_answer() -> RagAnswer {
        RagAnswer {
            label: AnswerLabel::Permitted,
            answer: "Permitted.".to_string(),
            citations: Vec::new(),
            rationale: "r".to_string(),
            refusal_reason: None,
            grounded: true,
        }
    }

    #[test]
    fn key_changes_with_every_component() {
        let profile = RetrievalProfile::default();
        let base = answer_cache_key("q", "kg1", "sc1", "m1", 5, &profile);
        assert_ne!(base, answer_cache_key("q2", "kg1", "sc1", "m1", 5, &profile));
        assert_ne!(base, answer_cache_key("q", "kg2", "sc1", "m1", 5, &profile));
        assert_ne!(base, answer_cache_key("q", "kg1", "sc2", "m1", 5, &profile));
        assert_ne!(base, answer_cache_key("q", "kg1", "sc1", "m2", 5, &profile));
        assert_ne!(base, answer_cache_key("q", "kg1", "sc1", "m1", 6, &profile));
        assert_ne!(
            base,
            answer_cache_key("q", "kg1", "sc1", "m1", 5, &RetrievalProfile::new(2, 0.5, 0))
        );
    }

    #[test]
    fn question_normalization_shares_entries() {
        let profile = RetrievalProfile::default();
        assert_eq!(
            answer_cache_key("  Is  an export LICENSE required? ", "k", "s", "m", 5, &profile),
            answer_cache_key("is an export license required?", "k", "s", "m", 5, &profile)
        );
    }

    #[tokio::test]
    async fn concurrent_duplicates_build_once() {
        let cache = Arc::new(AnswerCache::new(16));
        let builds = Arc::new(AtomicUsize::new(0));
        let key = "same-key".to_string();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let builds = builds.clone();
            let key = key.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_build(key, || async {
                        builds.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok(sample_answer())
                    })
                    .await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_build_is_not_cached_and_releases_its_gate() {
        let cache = AnswerCache::new(4);
        let err = cache
            .get_or_build("k".to_string(), || async {
                Err(RagError::Generator("boom".into()))
            })
            .await;
        assert!(err.is_err());
        assert_eq!(
            cache.inflight.len(),
            0,
            "a failed build must not leak its inflight gate"
        );

        let ok = cache
            .get_or_build("k".to_string(), || async { Ok(sample_answer()) })
            .await
            .unwrap();
        assert_eq!(ok.label, AnswerLabel::Permitted);
        assert_eq!(cache.inflight.len(), 0);
    }

    #[tokio::test]
    async fn repeated_failures_do_not_grow_the_inflight_map() {
        let cache = AnswerCache::new(4);
        for i in 0..32 {
            let _ = cache
                .get_or_build(format!("key-{i}"), || async {
                    Err(RagError::Generator("still down".into()))
                })
                .await;
        }
        assert_eq!(cache.inflight.len(), 0);
    }
}
