//! The integrity gate.
//!
//! A KG snapshot does not exist until every check here passes. Checks run
//! in a fixed order and the first failure aborts; the orchestrator records
//! the outcome in the audit ledger either way.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::emit::{emit_kg, EmitConfig, EntityRecord, KgSnapshot};
use crate::endpoint::{canonical_sort_nquads, SparqlClient};
use crate::error::KgError;
use crate::shapes::{validate_shapes, ShapeSet};
use crate::triple::{Triple, PROV_WAS_DERIVED_FROM, P_TEXT, RDF_TYPE};

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GateOutcome {
    pub digest: String,
    pub checks: Vec<CheckResult>,
    pub passed: bool,
}

/// Gate configuration: shapes to enforce, an optional tracked baseline
/// directory, and an optional endpoint for round-trip checks.
pub struct IntegrityGate {
    shapes: ShapeSet,
    baseline_dir: Option<PathBuf>,
}

impl IntegrityGate {
    pub fn new(shapes: ShapeSet) -> Self {
        Self {
            shapes,
            baseline_dir: None,
        }
    }

    pub fn with_baseline(mut self, dir: impl Into<PathBuf>) -> Self {
        self.baseline_dir = Some(dir.into());
        self
    }

    /// Run the offline gate: shapes, provenance minimum, legacy-IRI scan,
    /// determinism rebuild, baseline drift. Returns the emitted snapshot
    /// only when every check passes.
    pub fn run(
        &self,
        corpus: &corpus::Corpus,
        entities: &[EntityRecord],
        cfg: &EmitConfig,
    ) -> Result<(KgSnapshot, GateOutcome), KgError> {
        let snapshot = emit_kg(corpus, entities, cfg)?;
        let mut checks = Vec::new();

        let conforming = validate_shapes(&snapshot.triples, &self.shapes)?;
        checks.push(CheckResult {
            name: "shapes".into(),
            passed: true,
            detail: format!("{conforming} nodes conform"),
        });

        let missing = count_missing_provenance(&snapshot.triples);
        if missing != 0 {
            return Err(KgError::IntegrityFailure(format!(
                "{missing} content nodes missing prov:wasDerivedFrom"
            )));
        }
        checks.push(CheckResult {
            name: "provenance_minimum".into(),
            passed: true,
            detail: "0 nodes missing derivation".into(),
        });

        crate::emit::assert_canonical(&snapshot.triples)?;
        checks.push(CheckResult {
            name: "canonical_iris".into(),
            passed: true,
            detail: "no legacy iris".into(),
        });

        // Two independent builds must agree byte-for-byte.
        let rebuild = emit_kg(corpus, entities, cfg)?;
        if rebuild.digest != snapshot.digest {
            return Err(KgError::IntegrityFailure(format!(
                "determinism mismatch: {} vs {}",
                snapshot.digest, rebuild.digest
            )));
        }
        checks.push(CheckResult {
            name: "determinism_rebuild".into(),
            passed: true,
            detail: snapshot.digest.clone(),
        });

        if let Some(baseline_dir) = &self.baseline_dir {
            self.check_baseline(baseline_dir, &snapshot)?;
            checks.push(CheckResult {
                name: "baseline_drift".into(),
                passed: true,
                detail: format!("byte-equal to {}", baseline_dir.display()),
            });
        }

        info!(digest = %snapshot.digest, checks = checks.len(), "integrity_gate_passed");
        let outcome = GateOutcome {
            digest: snapshot.digest.clone(),
            checks,
            passed: true,
        };
        Ok((snapshot, outcome))
    }

    fn check_baseline(&self, baseline_dir: &Path, rebuilt: &KgSnapshot) -> Result<(), KgError> {
        let tracked_path = baseline_dir.join("kg.nq");
        let tracked = std::fs::read(&tracked_path)?;
        if tracked != rebuilt.nquads().as_bytes() {
            warn!(baseline = %tracked_path.display(), "baseline_drift");
            return Err(KgError::BaselineDrift {
                file: tracked_path.display().to_string(),
            });
        }
        Ok(())
    }

    /// Endpoint round-trip: load the snapshot, dump it back, and require
    /// the canonical sort of the dump to equal the canonical serialization.
    /// Lineage ASK probes must come back false.
    pub async fn check_endpoint(
        &self,
        client: &SparqlClient,
        snapshot: &KgSnapshot,
    ) -> Result<CheckResult, KgError> {
        client.load_graph(&snapshot.graph, &snapshot.nquads()).await?;
        let dump = client.dump_graph(&snapshot.graph).await?;
        let normalized = canonical_sort_nquads(&dump);
        if normalized != snapshot.nquads() {
            return Err(KgError::IntegrityFailure(
                "endpoint round-trip dump differs from canonical serialization".into(),
            ));
        }

        for probe in lineage_probes(&snapshot.graph) {
            if client.ask(&probe).await? {
                return Err(KgError::IntegrityFailure(format!(
                    "lineage probe matched violations: {probe}"
                )));
            }
        }
        Ok(CheckResult {
            name: "endpoint_round_trip".into(),
            passed: true,
            detail: snapshot.graph.clone(),
        })
    }
}

/// Content nodes (anything carrying text) missing `prov:wasDerivedFrom`.
pub fn count_missing_provenance(triples: &[Triple]) -> usize {
    use std::collections::BTreeSet;
    let with_text: BTreeSet<&str> = triples
        .iter()
        .filter(|t| t.predicate == P_TEXT)
        .map(|t| t.subject.as_str())
        .collect();
    let with_prov: BTreeSet<&str> = triples
        .iter()
        .filter(|t| t.predicate == PROV_WAS_DERIVED_FROM)
        .map(|t| t.subject.as_str())
        .collect();
    with_text.difference(&with_prov).count()
}

// ASK probes that must return false over a healthy graph.
fn lineage_probes(graph: &str) -> Vec<String> {
    vec![
        format!(
            "ASK {{ GRAPH <{graph}> {{ ?s <{P_TEXT}> ?text . \
             FILTER NOT EXISTS {{ ?s <{PROV_WAS_DERIVED_FROM}> ?src }} }} }}"
        ),
        format!(
            "ASK {{ GRAPH <{graph}> {{ ?s <{P_TEXT}> ?text . \
             FILTER NOT EXISTS {{ ?s <{RDF_TYPE}> ?type }} }} }}"
        ),
    ]
}
