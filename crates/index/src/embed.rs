//! Embedding seam and the deterministic default model.

/// Produces dense vectors for retrieval text. Implementations must be
/// deterministic for a given `model_id`; the sidecar records the id and the
/// loader refuses to mix models.
pub trait Embedder: Send + Sync {
    /// Stable model identifier recorded in the sidecar.
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Feature-hashing embedder: each lowercased whitespace token is hashed
/// into one signed dimension. Token overlap then shows up directly as
/// cosine similarity, with zero model assets and full reproducibility.
pub struct HashEmbedder {
    dim: usize,
    model_id: String,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self {
            model_id: format!("hash-{dim}.v1"),
            dim,
        }
    }
}

impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text.split_whitespace() {
            let h = fxhash::hash64(token.to_lowercase().as_bytes());
            let idx = (h % self.dim as u64) as usize;
            let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }
        l2_normalize_in_place(&mut v);
        v
    }
}

/// Normalize to unit length; the zero vector stays zero.
pub(crate) fn l2_normalize_in_place(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity over already-normalized vectors.
pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
