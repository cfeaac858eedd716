//! EarCrawler HTTP layer - offline-default, cassette-replayable fetching.
//!
//! Every upstream read (Federal Register, Trade.gov CSL, SPARQL endpoint)
//! goes through [`CachedHttpClient`]. Responses are stored in a
//! content-addressed disk cache keyed by a digest of the request; replays
//! are byte-stable, which is what makes corpus builds reproducible in CI
//! without network access.
//!
//! - **Offline by default**: a cache miss without `ALLOW_RECORD` fails with
//!   [`FetchError::Offline`] instead of reaching the network.
//! - **One-shot recording**: with `ALLOW_RECORD` set, one live call per key
//!   is permitted and its (redacted) response is written as a cassette.
//! - **Bounded retries**: idempotent methods only; 4xx is never retried,
//!   5xx and transport errors retry with exponential backoff + jitter on
//!   `tokio::time::sleep` - no blocking sleeps on async paths.
//! - **No secrets in keys or cassettes**: authorization-bearing headers are
//!   excluded from key derivation and scrubbed before anything hits disk.

mod cassette;
mod client;
mod config;
mod error;
mod retry;

pub use crate::cassette::{Cassette, CassetteStore};
pub use crate::client::{CachedHttpClient, FetchResponse};
pub use crate::config::FetchConfig;
pub use crate::error::FetchError;
pub use crate::retry::{backoff_delay, RetryPolicy};
