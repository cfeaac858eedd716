use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Sidecar does not match the active corpus or model; the index must
    /// be rebuilt. Loading fails closed on this.
    #[error("stale index: {0}")]
    Stale(String),

    #[error("sidecar missing beside index at {0}")]
    SidecarMissing(String),

    #[error("embedding dimension mismatch: index {expected}, query {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}
