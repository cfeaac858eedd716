//! Umbrella crate for the EarCrawler regulatory-knowledge pipeline.
//!
//! The `earcrawler` crate re-exports the pipeline layers so applications
//! and the CLI can drive the whole flow through a single dependency:
//!
//! ```text
//! Offline Snapshot ─▶ corpus ─▶ kg (+ integrity gate) ─▶ index ─▶ rag ─▶ server
//!                                      governance gates every mutation
//! ```
//!
//! [`context::AppContext`] is the composition root: it owns the audit
//! ledger, the policy engine, and the telemetry spool, and hands explicit
//! handles down to each stage. There are no process-wide singletons.
//!
//! [`orchestrator::run_pipeline`] sequences the end-to-end job with the
//! exit-code contract the CI wrapper depends on.

pub mod context;
pub mod eval;
pub mod orchestrator;

pub use context::AppContext;
pub use orchestrator::{run_pipeline, RunOptions, RunSummary, StepOutcome};

// Re-export the layers under their pipeline names.
pub use corpus;
pub use fetch;
pub use governance;
pub use ident;
pub use index;
pub use kg;
pub use rag;
pub use server;
pub use telemetry;
