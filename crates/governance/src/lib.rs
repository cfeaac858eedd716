//! EarCrawler governance core.
//!
//! Every mutating operation in the pipeline passes through this crate:
//! - RBAC policy decisions over a `reader < operator < maintainer < admin`
//!   role lattice, with every decision audited
//! - An append-only, hash-chained JSONL audit ledger with optional HMAC
//!   continuity and first-broken-line verification
//! - A deterministic redaction pass applied to every outbound payload
//!   (audit records, telemetry events, HTTP cassettes, logs)
//! - A retention/GC engine restricted to a whitelisted filesystem footprint
//!
//! Hashing discipline: canonical JSON bytes (sorted keys, no whitespace,
//! UTF-8), never pretty-printed output.

mod audit;
mod canon;
mod policy;
mod redact;
mod retention;

pub use crate::audit::{
    verify_ledger, AuditEntry, AuditError, AuditEventKind, AuditLedger, ChainStatus, VerifyReport,
};
pub use crate::canon::{canonical_json_bytes, sha256_hex};
pub use crate::policy::{Decision, PolicyEngine, PolicyError, Role};
pub use crate::redact::{redact_text, redact_value};
pub use crate::retention::{
    GcError, GcPlan, GcPlannedDeletion, RetentionEngine, RetentionPolicy, RetentionTarget,
};
