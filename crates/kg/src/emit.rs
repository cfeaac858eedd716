//! KG emission: corpus + entity list → sorted, digest-addressed RDF.

use corpus::{ChunkKind, Corpus};
use governance::{canonical_json_bytes, sha256_hex};
use ident::{build_doc_iri, canonicalize_iri, graph_iri, ENTITY_NS, RESOURCE_NS, SCHEMA_NS};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::KgError;
use crate::manifest::{KgManifest, KG_SCHEMA_VERSION};
use crate::serialize::{to_nquads, to_ntriples};
use crate::triple::{
    Term, Triple, DCT_ISSUED, DCT_SOURCE, OWL_SAME_AS, PROV_WAS_DERIVED_FROM, P_ENTITY_KIND,
    P_ORDINAL, P_PART_OF, P_SCHEMA_VERSION, P_SECTION_ID, P_TEXT, RDFS_LABEL, RDF_TYPE,
    TYPE_ENTITY, TYPE_ONTOLOGY, TYPE_PARAGRAPH, TYPE_SECTION, XSD_DATETIME, XSD_INTEGER,
};

/// Default deterministic timestamp: 2000-01-01T00:00:00Z.
pub const DEFAULT_SOURCE_DATE_EPOCH: i64 = 946_684_800;

/// A screened-party or regulatory entity to mint under the entity
/// namespace. External identifiers become `owl:sameAs` links or literals,
/// never canonical IRIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity_id: String,
    pub label: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub same_as: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct EmitConfig {
    /// Seconds since the epoch used for every `dct:issued`. Canonical
    /// output never reads the wall clock.
    pub source_date_epoch: i64,
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self {
            source_date_epoch: DEFAULT_SOURCE_DATE_EPOCH,
        }
    }
}

impl EmitConfig {
    /// Honor `SOURCE_DATE_EPOCH` when set, in the reproducible-builds
    /// convention; fall back to the pinned default otherwise.
    pub fn from_env() -> Self {
        let source_date_epoch = std::env::var("SOURCE_DATE_EPOCH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_SOURCE_DATE_EPOCH);
        Self { source_date_epoch }
    }

    pub fn issued_at(&self) -> String {
        chrono::DateTime::from_timestamp(self.source_date_epoch, 0)
            .unwrap_or_else(|| chrono::DateTime::from_timestamp(0, 0).expect("epoch"))
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }
}

/// An emitted snapshot: sorted triples, the content digest, and the
/// manifest binding digest ← inputs.
#[derive(Debug, Clone)]
pub struct KgSnapshot {
    pub triples: Vec<Triple>,
    pub digest: String,
    pub graph: String,
    pub manifest: KgManifest,
}

impl KgSnapshot {
    pub fn nquads(&self) -> String {
        to_nquads(&self.triples)
    }
}

/// Emit RDF for a corpus and entity list.
///
/// The digest is SHA-256 over the graph-independent canonical N-Triples,
/// because the named-graph IRI itself embeds the digest; the final quads
/// then carry `…/graph/kg/<digest>`.
pub fn emit_kg(
    corpus: &Corpus,
    entities: &[EntityRecord],
    cfg: &EmitConfig,
) -> Result<KgSnapshot, KgError> {
    let issued = cfg.issued_at();
    let snapshot_iri = format!(
        "{RESOURCE_NS}snapshot/{}",
        corpus.manifest.source_ref.replace(' ', "-")
    );

    // Graph is filled in after the digest is known.
    let mut triples: Vec<Triple> = Vec::new();
    let graph_placeholder = String::new();
    let push = |s: &str, p: &str, o: Term, triples: &mut Vec<Triple>| {
        triples.push(Triple::new(s, p, o, graph_placeholder.clone()));
    };

    // Ontology node pins the schema version and issue date.
    let ontology_iri = format!("{SCHEMA_NS}ontology");
    push(&ontology_iri, RDF_TYPE, Term::iri(TYPE_ONTOLOGY), &mut triples);
    push(
        &ontology_iri,
        P_SCHEMA_VERSION,
        Term::literal(KG_SCHEMA_VERSION),
        &mut triples,
    );
    push(
        &ontology_iri,
        DCT_ISSUED,
        Term::typed(&issued, XSD_DATETIME),
        &mut triples,
    );

    // Snapshot provenance node.
    push(&snapshot_iri, RDF_TYPE, Term::iri(TYPE_ONTOLOGY), &mut triples);
    push(
        &snapshot_iri,
        RDFS_LABEL,
        Term::literal(&corpus.manifest.source_ref),
        &mut triples,
    );
    push(
        &snapshot_iri,
        DCT_ISSUED,
        Term::typed(&issued, XSD_DATETIME),
        &mut triples,
    );

    for doc in &corpus.docs {
        let doc_iri = build_doc_iri(&doc.doc_id)?;
        let node_type = match doc.chunk_kind {
            ChunkKind::Section | ChunkKind::Subsection => TYPE_SECTION,
            ChunkKind::Paragraph => TYPE_PARAGRAPH,
        };
        push(&doc_iri, RDF_TYPE, Term::iri(node_type), &mut triples);
        push(
            &doc_iri,
            P_SECTION_ID,
            Term::literal(&doc.section_id),
            &mut triples,
        );
        push(&doc_iri, P_TEXT, Term::literal(&doc.text), &mut triples);
        let label = doc.title.as_deref().unwrap_or(&doc.section_id);
        push(&doc_iri, RDFS_LABEL, Term::literal(label), &mut triples);

        // Provenance minimum: every content node derives from the snapshot
        // and carries a source link.
        push(
            &doc_iri,
            PROV_WAS_DERIVED_FROM,
            Term::iri(&snapshot_iri),
            &mut triples,
        );
        let source = match &doc.url {
            // External references are literals, never canonical ids.
            Some(url) => Term::literal(url),
            None => Term::iri(&snapshot_iri),
        };
        push(&doc_iri, DCT_SOURCE, source, &mut triples);

        if let Some(parent_id) = &doc.parent_id {
            let parent_iri = build_doc_iri(parent_id)?;
            push(&doc_iri, P_PART_OF, Term::iri(&parent_iri), &mut triples);
        }
        if let Some(ordinal) = doc.ordinal {
            push(
                &doc_iri,
                P_ORDINAL,
                Term::typed(ordinal.to_string(), XSD_INTEGER),
                &mut triples,
            );
        }
    }

    for entity in entities {
        let entity_iri = format!("{ENTITY_NS}{}", entity.entity_id.replace(' ', "-"));
        push(&entity_iri, RDF_TYPE, Term::iri(TYPE_ENTITY), &mut triples);
        push(
            &entity_iri,
            RDFS_LABEL,
            Term::literal(&entity.label),
            &mut triples,
        );
        push(
            &entity_iri,
            P_ENTITY_KIND,
            Term::literal(&entity.kind),
            &mut triples,
        );
        push(
            &entity_iri,
            PROV_WAS_DERIVED_FROM,
            Term::iri(&snapshot_iri),
            &mut triples,
        );
        if let Some(url) = &entity.source_url {
            push(&entity_iri, DCT_SOURCE, Term::literal(url), &mut triples);
        }
        for external in &entity.same_as {
            push(&entity_iri, OWL_SAME_AS, Term::iri(external), &mut triples);
        }
    }

    assert_canonical(&triples)?;

    triples.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    triples.dedup();

    let digest = sha256_hex(to_ntriples(&triples).as_bytes());
    let graph = graph_iri(&digest);
    for triple in &mut triples {
        triple.graph = graph.clone();
    }

    let inputs_hash = sha256_hex(&canonical_json_bytes(&serde_json::json!({
        "corpus_digest": corpus.manifest.corpus_digest,
        "entities": entities,
        "schema_version": KG_SCHEMA_VERSION,
    }))?);

    info!(digest = %digest, triples = triples.len(), "kg_emitted");
    Ok(KgSnapshot {
        manifest: KgManifest {
            digest: digest.clone(),
            schema_version: KG_SCHEMA_VERSION.to_string(),
            inputs_hash,
            created_at: issued,
        },
        digest,
        graph,
        triples,
    })
}

/// Write the snapshot artifacts: canonical `kg.nq`, companion `kg.ttl`,
/// and the `.kgstate` manifest.
pub fn write_kg(snapshot: &KgSnapshot, dir: &std::path::Path) -> Result<(), KgError> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join("kg.nq"), snapshot.nquads())?;
    std::fs::write(
        dir.join("kg.ttl"),
        crate::serialize::to_turtle(&snapshot.triples),
    )?;
    crate::manifest::write_manifest(dir, &snapshot.manifest)?;
    Ok(())
}

// No canonical output may carry a legacy IRI, and every minted subject must
// live under a canonical namespace.
pub(crate) fn assert_canonical(triples: &[Triple]) -> Result<(), KgError> {
    for triple in triples {
        for iri in [&triple.subject, &triple.predicate] {
            if canonicalize_iri(iri) != **iri {
                return Err(KgError::ContractViolation(format!(
                    "legacy iri in output: {iri}"
                )));
            }
        }
        if let Term::Iri(object) = &triple.object {
            if canonicalize_iri(object) != *object {
                return Err(KgError::ContractViolation(format!(
                    "legacy iri in output: {object}"
                )));
            }
        }
        let subject_ok = triple.subject.starts_with(RESOURCE_NS)
            || triple.subject.starts_with(ENTITY_NS)
            || triple.subject.starts_with(SCHEMA_NS);
        if !subject_ok {
            return Err(KgError::ContractViolation(format!(
                "non-canonical subject: {}",
                triple.subject
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use corpus::{build_corpus, CorpusConfig};

    pub(crate) fn fixture_corpus() -> Corpus {
        let dir = tempfile::tempdir().unwrap();
        let payload = concat!(
            "{\"section_id\":\"EAR-736.2(b)\",\"text\":\"General prohibitions.\"}\n",
            "{\"section_id\":\"EAR-744.1\",\"text\":\"Scope of controls.\"}\n",
            "{\"section_id\":\"EAR-772.1\",\"text\":\"Definitions.\"}\n",
        );
        let manifest = serde_json::json!({
            "manifest_version": "offline-snapshot.v1",
            "snapshot_id": "ecfr-2026-06-01",
            "created_at": "2026-06-01T00:00:00Z",
            "source": {
                "owner": "export-admin", "upstream": "https://www.ecfr.gov/",
                "approved_by": "compliance", "approved_at": "2026-06-02T00:00:00Z"
            },
            "scope": {"titles": ["15"], "parts": ["736", "744", "772"]},
            "payload": {
                "path": "snapshot.jsonl",
                "sha256": governance::sha256_hex(payload.as_bytes()),
                "size_bytes": payload.len()
            }
        });
        std::fs::write(dir.path().join("snapshot.jsonl"), payload).unwrap();
        std::fs::write(
            dir.path().join("manifest.json"),
            serde_json::to_vec(&manifest).unwrap(),
        )
        .unwrap();
        let snapshot = corpus::validate_snapshot(dir.path()).unwrap();
        build_corpus(&snapshot, &CorpusConfig::default()).unwrap()
    }

    #[test]
    fn emission_is_deterministic() {
        let corpus = fixture_corpus();
        let cfg = EmitConfig::default();
        let a = emit_kg(&corpus, &[], &cfg).unwrap();
        let b = emit_kg(&corpus, &[], &cfg).unwrap();
        assert_eq!(a.digest, b.digest);
        assert_eq!(a.nquads(), b.nquads());
    }

    #[test]
    fn graph_iri_embeds_snapshot_digest() {
        let corpus = fixture_corpus();
        let snapshot = emit_kg(&corpus, &[], &EmitConfig::default()).unwrap();
        assert_eq!(
            snapshot.graph,
            format!("https://ear.example.org/graph/kg/{}", snapshot.digest)
        );
        assert!(snapshot.triples.iter().all(|t| t.graph == snapshot.graph));
    }

    #[test]
    fn every_content_node_carries_provenance() {
        let corpus = fixture_corpus();
        let snapshot = emit_kg(&corpus, &[], &EmitConfig::default()).unwrap();
        for doc in &corpus.docs {
            let iri = build_doc_iri(&doc.doc_id).unwrap();
            assert!(
                snapshot
                    .triples
                    .iter()
                    .any(|t| t.subject == iri && t.predicate == PROV_WAS_DERIVED_FROM),
                "{iri} missing prov:wasDerivedFrom"
            );
            assert!(snapshot
                .triples
                .iter()
                .any(|t| t.subject == iri && t.predicate == DCT_SOURCE));
        }
    }

    #[test]
    fn entities_mint_same_as_links_not_canonical_ids() {
        let corpus = fixture_corpus();
        let entities = vec![EntityRecord {
            entity_id: "csl-12345".to_string(),
            label: "Example Trading Co".to_string(),
            kind: "entity_list".to_string(),
            source_url: Some("https://www.trade.gov/csl/12345".to_string()),
            same_as: vec!["https://www.wikidata.org/entity/Q1".to_string()],
        }];
        let snapshot = emit_kg(&corpus, &entities, &EmitConfig::default()).unwrap();
        let entity_iri = "https://ear.example.org/entity/csl-12345";
        assert!(snapshot
            .triples
            .iter()
            .any(|t| t.subject == entity_iri && t.predicate == OWL_SAME_AS));
        // The external URL stays a literal on dct:source.
        assert!(snapshot.triples.iter().any(|t| t.subject == entity_iri
            && t.predicate == DCT_SOURCE
            && matches!(&t.object, Term::Literal { value, .. } if value.contains("trade.gov"))));
    }

    #[test]
    fn issued_comes_from_source_date_epoch() {
        let corpus = fixture_corpus();
        let cfg = EmitConfig {
            source_date_epoch: 946_684_800,
        };
        let snapshot = emit_kg(&corpus, &[], &cfg).unwrap();
        assert_eq!(snapshot.manifest.created_at, "2000-01-01T00:00:00Z");
    }

    #[test]
    fn different_entities_change_inputs_hash_only_when_content_differs() {
        let corpus = fixture_corpus();
        let cfg = EmitConfig::default();
        let plain = emit_kg(&corpus, &[], &cfg).unwrap();
        let with_entity = emit_kg(
            &corpus,
            &[EntityRecord {
                entity_id: "e1".to_string(),
                label: "E1".to_string(),
                kind: "entity_list".to_string(),
                source_url: None,
                same_as: vec![],
            }],
            &cfg,
        )
        .unwrap();
        assert_ne!(plain.digest, with_entity.digest);
        assert_ne!(plain.manifest.inputs_hash, with_entity.manifest.inputs_hash);
    }
}
