//! RDF triple model and vocabulary.
//!
//! Minimal by intent: the emitter produces quads in a single named graph,
//! with IRI and literal objects only (no blank nodes - every node here has
//! a canonical identity, which is what makes sorted serialization stable).

use serde::{Deserialize, Serialize};

// Schema terms under the canonical namespace.
pub const TYPE_SECTION: &str = "https://ear.example.org/schema#Section";
pub const TYPE_PARAGRAPH: &str = "https://ear.example.org/schema#Paragraph";
pub const TYPE_ENTITY: &str = "https://ear.example.org/schema#Entity";
pub const TYPE_ONTOLOGY: &str = "https://ear.example.org/schema#Ontology";
pub const P_SECTION_ID: &str = "https://ear.example.org/schema#sectionId";
pub const P_TEXT: &str = "https://ear.example.org/schema#text";
pub const P_PART_OF: &str = "https://ear.example.org/schema#partOf";
pub const P_ORDINAL: &str = "https://ear.example.org/schema#ordinal";
pub const P_SCHEMA_VERSION: &str = "https://ear.example.org/schema#schemaVersion";
pub const P_ENTITY_KIND: &str = "https://ear.example.org/schema#entityKind";

// Well-known external vocabulary.
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDFS_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";
pub const DCT_SOURCE: &str = "http://purl.org/dc/terms/source";
pub const DCT_ISSUED: &str = "http://purl.org/dc/terms/issued";
pub const PROV_WAS_DERIVED_FROM: &str = "http://www.w3.org/ns/prov#wasDerivedFrom";
pub const OWL_SAME_AS: &str = "http://www.w3.org/2002/07/owl#sameAs";
pub const XSD_DATETIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";

/// Object position of a triple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Term {
    Iri(String),
    Literal {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lang: Option<String>,
    },
}

impl Term {
    pub fn iri(value: impl Into<String>) -> Self {
        Term::Iri(value.into())
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: None,
            lang: None,
        }
    }

    pub fn typed(value: impl Into<String>, datatype: &str) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: Some(datatype.to_string()),
            lang: None,
        }
    }
}

/// One quad in the snapshot's named graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: Term,
    pub graph: String,
}

impl Triple {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: Term,
        graph: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object,
            graph: graph.into(),
        }
    }

    /// Canonical sort key: (subject, predicate, object, graph).
    pub fn sort_key(&self) -> (&str, &str, &Term, &str) {
        (&self.subject, &self.predicate, &self.object, &self.graph)
    }
}

/// Escape a literal value for N-Quads / N-Triples.
pub fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}
