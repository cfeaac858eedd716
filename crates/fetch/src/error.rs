use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Cache miss while offline recording is disabled. Carries the cache
    /// key so operators can see which cassette is missing.
    #[error("offline and no cassette for key {0}")]
    Offline(String),

    /// Non-success status after retries were exhausted or skipped.
    #[error("upstream returned status {status} for {url}")]
    Status { status: u16, url: String },

    /// Transport-level failure (DNS, connect, TLS, read).
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0} attempts")]
    Timeout(u32),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cassette decode error: {0}")]
    Cassette(#[from] serde_json::Error),

    /// Recording was attempted with a non-idempotent method.
    #[error("method {0} is not replayable")]
    NotReplayable(String),
}

impl FetchError {
    /// Transient failures are eligible for retry; everything else fails fast.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport(_) | FetchError::Timeout(_) => true,
            FetchError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
