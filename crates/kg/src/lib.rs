//! EarCrawler Knowledge-Graph Layer - Emission and the Integrity Gate
//!
//! This crate mints canonical IRIs from a corpus, emits RDF under the
//! canonical namespaces, and refuses to let a snapshot exist unless it
//! passes the integrity gate.
//!
//! # Core Guarantee
//!
//! > **A KG snapshot's digest is a pure function of (corpus_digest,
//! > entity list, schema version, SOURCE_DATE_EPOCH).**
//!
//! Triples are sorted by (graph, subject, predicate, object) before
//! serialization, so parallel emission order never leaks into the bytes.
//! The digest recorded in `kg/.kgstate/manifest.json` is the snapshot's
//! identity and appears in the named-graph IRI.
//!
//! # The gate
//!
//! Emission is not complete until [`gate::IntegrityGate`] has passed:
//! shape conformance (version-matched), provenance minimum, no legacy
//! IRIs, baseline drift, and a determinism rebuild. Endpoint round-trip
//! checks run when a SPARQL endpoint is configured.

pub mod csl;
pub mod emit;
pub mod endpoint;
pub mod gate;
pub mod manifest;
pub mod serialize;
pub mod shapes;
pub mod templates;
pub mod triple;

mod error;

pub use crate::csl::fetch_entities;
pub use crate::emit::{emit_kg, write_kg, EmitConfig, EntityRecord, KgSnapshot};
pub use crate::endpoint::{canonical_sort_nquads, SparqlClient};
pub use crate::error::KgError;
pub use crate::gate::{count_missing_provenance, CheckResult, GateOutcome, IntegrityGate};
pub use crate::manifest::{load_manifest, write_manifest, KgManifest, KGSTATE_DIR, KG_SCHEMA_VERSION};
pub use crate::serialize::{to_nquads, to_turtle};
pub use crate::shapes::{builtin_shapes, validate_shapes, ShapeSet};
pub use crate::templates::{render_template, template_names};
pub use crate::triple::{Term, Triple};
