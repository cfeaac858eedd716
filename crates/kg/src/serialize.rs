//! Sorted RDF serializers.
//!
//! N-Quads is the canonical form and the digest source; Turtle is emitted
//! alongside for human inspection. Both are produced from the same sorted
//! triple slice, so the two files always agree.

use std::collections::BTreeMap;

use crate::triple::{escape_literal, Term, Triple};

fn term_to_string(term: &Term) -> String {
    match term {
        Term::Iri(iri) => format!("<{iri}>"),
        Term::Literal {
            value,
            datatype,
            lang,
        } => {
            let escaped = escape_literal(value);
            match (datatype, lang) {
                (Some(dt), _) => format!("\"{escaped}\"^^<{dt}>"),
                (None, Some(lang)) => format!("\"{escaped}\"@{lang}"),
                (None, None) => format!("\"{escaped}\""),
            }
        }
    }
}

/// Canonical N-Quads: one sorted line per triple, LF, trailing newline.
pub fn to_nquads(triples: &[Triple]) -> String {
    let mut lines: Vec<String> = triples
        .iter()
        .map(|t| {
            format!(
                "<{}> <{}> {} <{}> .",
                t.subject,
                t.predicate,
                term_to_string(&t.object),
                t.graph
            )
        })
        .collect();
    lines.sort();
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Graph-independent N-Triples, used to derive the snapshot digest before
/// the named-graph IRI (which embeds that digest) exists.
pub fn to_ntriples(triples: &[Triple]) -> String {
    let mut lines: Vec<String> = triples
        .iter()
        .map(|t| {
            format!(
                "<{}> <{}> {} .",
                t.subject,
                t.predicate,
                term_to_string(&t.object)
            )
        })
        .collect();
    lines.sort();
    lines.dedup();
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Turtle with the canonical prefix block, grouped by subject.
pub fn to_turtle(triples: &[Triple]) -> String {
    let mut out = String::new();
    out.push_str("@prefix ear: <https://ear.example.org/schema#> .\n");
    out.push_str("@prefix dct: <http://purl.org/dc/terms/> .\n");
    out.push_str("@prefix prov: <http://www.w3.org/ns/prov#> .\n");
    out.push_str("@prefix owl: <http://www.w3.org/2002/07/owl#> .\n");
    out.push_str("@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .\n\n");

    let mut by_subject: BTreeMap<&str, Vec<&Triple>> = BTreeMap::new();
    for triple in triples {
        by_subject.entry(&triple.subject).or_default().push(triple);
    }
    for (subject, mut group) in by_subject {
        group.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        out.push_str(&format!("<{subject}>\n"));
        for (i, triple) in group.iter().enumerate() {
            let sep = if i + 1 == group.len() { " ." } else { " ;" };
            out.push_str(&format!(
                "    <{}> {}{sep}\n",
                triple.predicate,
                term_to_string(&triple.object)
            ));
        }
        out.push('\n');
    }
    out
}
