//! EarCrawler read-only HTTP facade.
//!
//! Serves curated queries over the approved KG snapshot and the cached RAG
//! surface. Strictly read-only: nothing behind these routes mutates a
//! snapshot, an index, or the ledger.
//!
//! Budgets (enforced, not advisory): body ≤ 32 KiB, 5 s per-request
//! timeout, 16 requests in flight, token-bucket rate limits per identity
//! (anonymous 30 rpm / burst 10, keyed 120 rpm / burst 20). Errors use
//! problem-details bodies with stable type URIs and a `trace_id`; limiter
//! state is exposed through `X-RateLimit-*` and `Retry-After` headers.

pub mod config;
pub mod error;
pub mod limit;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use crate::config::FacadeConfig;
pub use crate::error::{ApiError, ApiResult};
pub use crate::limit::{RateDecision, RateLimiter};
pub use crate::server::{build_router, start_server};
pub use crate::state::AppState;
