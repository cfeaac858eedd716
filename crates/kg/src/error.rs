use thiserror::Error;

#[derive(Debug, Error)]
pub enum KgError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("identifier error: {0}")]
    Id(#[from] ident::IdError),

    #[error("corpus error: {0}")]
    Corpus(#[from] corpus::CorpusError),

    /// A non-canonical IRI reached the emitter output.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// Shape non-conformance, provenance gaps, baseline drift, or a
    /// determinism mismatch. Aborts emission.
    #[error("integrity failure: {0}")]
    IntegrityFailure(String),

    #[error("shapes schema version {found:?} does not match validator {expected:?}")]
    ShapesVersionMismatch { expected: String, found: String },

    #[error("baseline drift in {file}: rebuilt bytes differ from tracked baseline")]
    BaselineDrift { file: String },

    #[error("sparql endpoint error: {0}")]
    Endpoint(#[from] fetch::FetchError),

    #[error("sparql response malformed: {0}")]
    EndpointResponse(String),
}
