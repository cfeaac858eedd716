//! Canonical IRI minting and the closed legacy-alias table.
//!
//! Section IRIs are minted from canonical section ids with strict RFC 3986
//! percent-encoding (everything outside the unreserved set is escaped), so
//! an IRI is a pure function of its id. The alias table exists only for
//! backward reads: emission code never consults it, and unknown IRIs pass
//! through [`canonicalize_iri`] unchanged.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::IdError;
use crate::section::is_canonical_id;

/// Schema term namespace.
pub const SCHEMA_NS: &str = "https://ear.example.org/schema#";
/// Resource namespace.
pub const RESOURCE_NS: &str = "https://ear.example.org/resource/";
/// Entity namespace.
pub const ENTITY_NS: &str = "https://ear.example.org/entity/";
/// Named-graph namespace.
pub const GRAPH_NS: &str = "https://ear.example.org/graph/";
/// Moving "latest" graph pointer. Never an identity; the digest graph is.
pub const MAIN_GRAPH_IRI: &str = "https://ear.example.org/graph/main";
/// Prefix shared by all section resource IRIs.
pub const SECTION_RESOURCE_PREFIX: &str = "https://ear.example.org/resource/ear/section/";

// RFC 3986 unreserved characters stay literal; everything else is escaped.
const STRICT_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

// Legacy namespace prefixes from the pre-canonical emitter. The table is
// closed: emissions mint canonical IRIs directly and never extend it.
static LEGACY_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (
            "https://ear.example.org/resource/section/",
            SECTION_RESOURCE_PREFIX,
        ),
        (
            "http://ear.example.org/resource/ear/section/",
            SECTION_RESOURCE_PREFIX,
        ),
        ("https://ear.example.org/vocab#", SCHEMA_NS),
    ])
});

/// Mint the canonical IRI for a canonical section id.
///
/// # Errors
///
/// [`IdError::InvalidId`] when `section_id` is not already canonical; this
/// function never normalizes on the caller's behalf.
pub fn build_section_iri(section_id: &str) -> Result<String, IdError> {
    if !is_canonical_id(section_id) {
        return Err(IdError::invalid(section_id));
    }
    let encoded = utf8_percent_encode(section_id, STRICT_SEGMENT);
    Ok(format!("{SECTION_RESOURCE_PREFIX}{encoded}"))
}

/// Mint the canonical IRI for a retrieval doc id, which may carry a
/// `#pNNNN` anchor. The anchor's `#` is percent-encoded so the IRI stays a
/// single opaque resource name rather than an IRI-with-fragment.
pub fn build_doc_iri(doc_id: &str) -> Result<String, IdError> {
    let (section, anchor) = crate::section::split_doc_id(doc_id);
    if !is_canonical_id(section) {
        return Err(IdError::invalid(doc_id));
    }
    if doc_id.contains('#') && anchor.is_none() {
        return Err(IdError::anchor(doc_id));
    }
    let encoded = utf8_percent_encode(doc_id, STRICT_SEGMENT);
    Ok(format!("{SECTION_RESOURCE_PREFIX}{encoded}"))
}

/// Named-graph IRI for a KG snapshot digest.
pub fn graph_iri(snapshot_digest: &str) -> String {
    format!("{GRAPH_NS}kg/{snapshot_digest}")
}

/// Map a legacy IRI onto its canonical equivalent.
///
/// Lookup is against the closed alias table; unknown IRIs pass through
/// unchanged, which makes the function idempotent and safe to apply to
/// already-canonical input.
pub fn canonicalize_iri(iri: &str) -> String {
    for (legacy, canonical) in LEGACY_ALIASES.iter() {
        if let Some(local) = iri.strip_prefix(legacy) {
            return format!("{canonical}{local}");
        }
    }
    iri.to_string()
}

/// Recover the canonical section id from a section IRI, for grounding
/// checks. Returns `None` for IRIs outside the section namespace or whose
/// decoded local name is not a canonical id.
pub fn section_id_from_iri(iri: &str) -> Option<String> {
    let canonical = canonicalize_iri(iri);
    let local = canonical.strip_prefix(SECTION_RESOURCE_PREFIX)?;
    let decoded = percent_decode_str(local).decode_utf8().ok()?;
    if is_canonical_id(&decoded) {
        Some(decoded.into_owned())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_iri_percent_encodes_parens() {
        let iri = build_section_iri("EAR-736.2(b)").unwrap();
        assert_eq!(
            iri,
            "https://ear.example.org/resource/ear/section/EAR-736.2%28b%29"
        );
    }

    #[test]
    fn non_canonical_id_refused() {
        assert!(build_section_iri("736.2(b)").is_err());
        assert!(build_section_iri("EAR-736.2(B)").is_err());
    }

    #[test]
    fn legacy_alias_rewrites_to_canonical() {
        let legacy = "https://ear.example.org/resource/section/EAR-736.2%28b%29";
        let canonical = canonicalize_iri(legacy);
        assert_eq!(
            canonical,
            "https://ear.example.org/resource/ear/section/EAR-736.2%28b%29"
        );
        // Idempotent: a second pass is a no-op.
        assert_eq!(canonicalize_iri(&canonical), canonical);
    }

    #[test]
    fn unknown_iri_passes_through() {
        let iri = "https://www.federalregister.gov/documents/2024/01/01/example";
        assert_eq!(canonicalize_iri(iri), iri);
    }

    #[test]
    fn section_id_recovered_from_legacy_and_canonical() {
        let canonical = build_section_iri("EAR-736.2(b)").unwrap();
        assert_eq!(
            section_id_from_iri(&canonical).as_deref(),
            Some("EAR-736.2(b)")
        );
        let legacy = "https://ear.example.org/resource/section/EAR-736.2%28b%29";
        assert_eq!(section_id_from_iri(legacy).as_deref(), Some("EAR-736.2(b)"));
        assert_eq!(section_id_from_iri("https://example.com/x"), None);
    }

    #[test]
    fn doc_iri_encodes_anchor_hash() {
        let iri = build_doc_iri("EAR-736.2(b)#p0007").unwrap();
        assert_eq!(
            iri,
            "https://ear.example.org/resource/ear/section/EAR-736.2%28b%29%23p0007"
        );
        assert!(build_doc_iri("EAR-736.2(b)#px").is_err());
    }

    #[test]
    fn graph_iri_embeds_digest() {
        let iri = graph_iri("abc123");
        assert_eq!(iri, "https://ear.example.org/graph/kg/abc123");
        assert_ne!(iri, MAIN_GRAPH_IRI);
    }
}
