//! Allowlisted SPARQL templates.
//!
//! Free-form SPARQL never crosses a trust boundary: the RAG expander and
//! the HTTP facade both go through this closed registry. Parameters are
//! substituted as N-Triples terms with strict validation, so a parameter
//! cannot smuggle query syntax.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use crate::error::KgError;

/// name → (description, template). `{iri}` and `{graph}` placeholders are
/// the only substitution points.
static TEMPLATES: Lazy<BTreeMap<&'static str, (&'static str, &'static str)>> = Lazy::new(|| {
    BTreeMap::from([
        (
            "neighbors",
            (
                "Outbound and inbound neighbors of a node, with labels",
                "SELECT ?p ?o ?label WHERE { GRAPH <{graph}> { \
                 { <{iri}> ?p ?o } UNION { ?o ?p <{iri}> } \
                 OPTIONAL { ?o <http://www.w3.org/2000/01/rdf-schema#label> ?label } } } LIMIT 64",
            ),
        ),
        (
            "lineage",
            (
                "Provenance chain of a node",
                "SELECT ?src WHERE { GRAPH <{graph}> { \
                 <{iri}> <http://www.w3.org/ns/prov#wasDerivedFrom> ?src } }",
            ),
        ),
        (
            "entity",
            (
                "All properties of an entity node",
                "SELECT ?p ?o WHERE { GRAPH <{graph}> { <{iri}> ?p ?o } } LIMIT 256",
            ),
        ),
        (
            "section_text",
            (
                "Text and label of a section node",
                "SELECT ?text ?label WHERE { GRAPH <{graph}> { \
                 <{iri}> <https://ear.example.org/schema#text> ?text . \
                 OPTIONAL { <{iri}> <http://www.w3.org/2000/01/rdf-schema#label> ?label } } }",
            ),
        ),
    ])
});

/// Names of all registered templates, for the facade's health surface.
pub fn template_names() -> Vec<&'static str> {
    TEMPLATES.keys().copied().collect()
}

/// Render a template by name. Unknown names and malformed IRIs are
/// rejected; there is no escape hatch to raw SPARQL.
pub fn render_template(name: &str, graph: &str, iri: &str) -> Result<String, KgError> {
    let Some((_, template)) = TEMPLATES.get(name) else {
        return Err(KgError::ContractViolation(format!(
            "sparql template {name:?} is not allowlisted"
        )));
    };
    for value in [graph, iri] {
        if !is_safe_iri(value) {
            return Err(KgError::ContractViolation(format!(
                "unsafe iri parameter: {value:?}"
            )));
        }
    }
    Ok(template.replace("{graph}", graph).replace("{iri}", iri))
}

// An absolute http(s) IRI with none of the characters that could terminate
// the enclosing <...> term or open a new clause.
fn is_safe_iri(value: &str) -> bool {
    (value.starts_with("https://") || value.starts_with("http://"))
        && !value.contains(['<', '>', '"', ' ', '\n', '\r', '\t', '{', '}', '\\'])
}
