//! Shape validation.
//!
//! Shapes are declared data (class → required predicates), version-pinned
//! to the emitter schema. A shapes file whose `schema_version` does not
//! match the validator is itself an integrity failure - silently validating
//! against stale shapes is how drift sneaks in.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::KgError;
use crate::manifest::KG_SCHEMA_VERSION;
use crate::triple::{
    Term, Triple, DCT_SOURCE, PROV_WAS_DERIVED_FROM, P_ENTITY_KIND, P_PART_OF, P_SECTION_ID,
    P_TEXT, RDFS_LABEL, RDF_TYPE, TYPE_ENTITY, TYPE_PARAGRAPH, TYPE_SECTION,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeShape {
    pub name: String,
    pub target_class: String,
    pub required: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeSet {
    pub schema_version: String,
    pub shapes: Vec<NodeShape>,
}

impl ShapeSet {
    pub fn load(path: &Path) -> Result<Self, KgError> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// The shapes the emitter is written against.
pub fn builtin_shapes() -> ShapeSet {
    ShapeSet {
        schema_version: KG_SCHEMA_VERSION.to_string(),
        shapes: vec![
            NodeShape {
                name: "SectionShape".to_string(),
                target_class: TYPE_SECTION.to_string(),
                required: vec![
                    P_SECTION_ID.to_string(),
                    P_TEXT.to_string(),
                    RDFS_LABEL.to_string(),
                    PROV_WAS_DERIVED_FROM.to_string(),
                    DCT_SOURCE.to_string(),
                ],
            },
            NodeShape {
                name: "ParagraphShape".to_string(),
                target_class: TYPE_PARAGRAPH.to_string(),
                required: vec![
                    P_SECTION_ID.to_string(),
                    P_TEXT.to_string(),
                    P_PART_OF.to_string(),
                    PROV_WAS_DERIVED_FROM.to_string(),
                    DCT_SOURCE.to_string(),
                ],
            },
            NodeShape {
                name: "EntityShape".to_string(),
                target_class: TYPE_ENTITY.to_string(),
                required: vec![
                    RDFS_LABEL.to_string(),
                    P_ENTITY_KIND.to_string(),
                    PROV_WAS_DERIVED_FROM.to_string(),
                ],
            },
        ],
    }
}

/// Check every typed node against its shape.
///
/// Returns the conforming node count; the first violation aborts with an
/// [`KgError::IntegrityFailure`] naming node, shape, and missing predicate.
pub fn validate_shapes(triples: &[Triple], shapes: &ShapeSet) -> Result<usize, KgError> {
    if shapes.schema_version != KG_SCHEMA_VERSION {
        return Err(KgError::ShapesVersionMismatch {
            expected: KG_SCHEMA_VERSION.to_string(),
            found: shapes.schema_version.clone(),
        });
    }

    // subject → (types, predicates)
    let mut types: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let mut predicates: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for triple in triples {
        predicates
            .entry(triple.subject.as_str())
            .or_default()
            .insert(triple.predicate.as_str());
        if triple.predicate == RDF_TYPE {
            if let Term::Iri(class) = &triple.object {
                types
                    .entry(triple.subject.as_str())
                    .or_default()
                    .insert(class.as_str());
            }
        }
    }

    let mut conforming = 0usize;
    for shape in &shapes.shapes {
        for (subject, subject_types) in &types {
            if !subject_types.contains(shape.target_class.as_str()) {
                continue;
            }
            let present = predicates.get(subject).cloned().unwrap_or_default();
            for required in &shape.required {
                if !present.contains(required.as_str()) {
                    return Err(KgError::IntegrityFailure(format!(
                        "node {subject} violates {}: missing {required}",
                        shape.name
                    )));
                }
            }
            conforming += 1;
        }
    }
    Ok(conforming)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::{emit_kg, EmitConfig};

    #[test]
    fn emitted_snapshot_conforms_to_builtin_shapes() {
        let corpus = crate::emit::tests::fixture_corpus();
        let snapshot = emit_kg(&corpus, &[], &EmitConfig::default()).unwrap();
        let conforming = validate_shapes(&snapshot.triples, &builtin_shapes()).unwrap();
        assert_eq!(conforming, corpus.docs.len());
    }

    #[test]
    fn missing_provenance_is_integrity_failure() {
        let corpus = crate::emit::tests::fixture_corpus();
        let mut snapshot = emit_kg(&corpus, &[], &EmitConfig::default()).unwrap();
        snapshot
            .triples
            .retain(|t| t.predicate != PROV_WAS_DERIVED_FROM);
        let err = validate_shapes(&snapshot.triples, &builtin_shapes()).unwrap_err();
        assert!(matches!(err, KgError::IntegrityFailure(_)));
        assert!(err.to_string().contains("wasDerivedFrom"));
    }

    #[test]
    fn version_mismatch_refused() {
        let corpus = crate::emit::tests::fixture_corpus();
        let snapshot = emit_kg(&corpus, &[], &EmitConfig::default()).unwrap();
        let mut shapes = builtin_shapes();
        shapes.schema_version = "ear-kg.v0".to_string();
        assert!(matches!(
            validate_shapes(&snapshot.triples, &shapes).unwrap_err(),
            KgError::ShapesVersionMismatch { .. }
        ));
    }
}
