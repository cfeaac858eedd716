use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("index error: {0}")]
    Index(#[from] index::IndexError),

    #[error("kg error: {0}")]
    Kg(#[from] kg::KgError),

    #[error("generator error: {0}")]
    Generator(String),

    /// The generator produced a label outside the closed set, or otherwise
    /// violated the output contract.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
