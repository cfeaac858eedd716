//! EarCrawler Identifier Layer - Canonical Section IDs and IRIs
//!
//! This crate is the identity algebra for the whole pipeline: every section
//! identifier and every IRI that appears in a corpus, knowledge-graph
//! snapshot, or citation flows through the functions here.
//!
//! # Overview
//!
//! The `ident` crate is responsible for:
//! - **Section ID normalization**: Turning the many surface forms of an EAR
//!   citation (`"§ 736.2(B)"`, `"15 CFR 736.2(b)"`, `"EAR 736.2(B)"`) into
//!   one canonical form (`"EAR-736.2(b)"`)
//! - **Anchored doc IDs**: `<section_id>#pNNNN` child identifiers used only
//!   inside retrieval corpora
//! - **IRI minting**: Deterministic, RFC 3986 percent-encoded resource IRIs
//!   under the canonical namespaces
//! - **Legacy alias resolution**: A closed table mapping legacy IRIs onto
//!   canonical ones for backward reads
//!
//! # Core Guarantee
//!
//! > **Normalization is total, idempotent, and locale-free.**
//!
//! For every input that can reach the canonical pattern after the rule set,
//! `normalize_section_id` returns the same canonical string on every
//! platform; for every input that cannot, it returns [`IdError::InvalidId`].
//! `normalize(normalize(x)) == normalize(x)` holds for all accepted inputs.
//!
//! This crate is pure: no I/O, no clock, no locale.
//!
//! # Quick Start
//!
//! ```rust
//! use ident::{build_section_iri, normalize_section_id};
//!
//! let id = normalize_section_id("§ 736.2(B)").unwrap();
//! assert_eq!(id, "EAR-736.2(b)");
//!
//! let iri = build_section_iri(&id).unwrap();
//! assert_eq!(
//!     iri,
//!     "https://ear.example.org/resource/ear/section/EAR-736.2%28b%29"
//! );
//! ```

mod error;
mod iri;
mod section;

pub use crate::error::IdError;
pub use crate::iri::{
    build_doc_iri, build_section_iri, canonicalize_iri, graph_iri, section_id_from_iri, ENTITY_NS,
    GRAPH_NS, MAIN_GRAPH_IRI, RESOURCE_NS, SCHEMA_NS, SECTION_RESOURCE_PREFIX,
};
pub use crate::section::{is_canonical_id, normalize_doc_id, normalize_section_id, split_doc_id};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_forms_converge() {
        let forms = [
            "§ 736.2(B)",
            "15 CFR 736.2(b)",
            "EAR 736.2(B)",
            "EAR-736.2(b)",
        ];
        for form in forms {
            assert_eq!(
                normalize_section_id(form).expect("normalizable"),
                "EAR-736.2(b)",
                "input {form:?}"
            );
        }
    }

    #[test]
    fn normalization_is_idempotent() {
        let inputs = ["EAR-736.2(b)", "§ 744.1", "15 CFR 772.1(a)(1)"];
        for input in inputs {
            let once = normalize_section_id(input).expect("first pass");
            let twice = normalize_section_id(&once).expect("second pass");
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn iri_round_trips_through_alias_table() {
        let id = normalize_section_id("EAR-736.2(b)").unwrap();
        let iri = build_section_iri(&id).unwrap();
        assert_eq!(canonicalize_iri(&iri), iri);
        assert_eq!(section_id_from_iri(&iri).as_deref(), Some(id.as_str()));
    }
}
