//! Evaluation harness: dataset grounding and coverage checks.
//!
//! Dataset records cite sections by canonical id in `ear_sections`; the
//! harness enforces the citation invariant (every cited id resolves to
//! exactly one retrieval document, with no anchor suffix) and measures
//! coverage of the corpus against a dataset.

use std::collections::BTreeMap;
use std::path::Path;

use corpus::Corpus;
use serde::{Deserialize, Serialize};

/// One evaluation record. Unknown fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalRecord {
    pub id: String,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub ear_sections: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroundingReport {
    pub records: usize,
    pub citations: usize,
    pub violations: Vec<GroundingViolation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroundingViolation {
    pub record_id: String,
    pub cited: String,
    pub reason: String,
}

impl GroundingReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }
}

pub fn load_dataset(path: &Path) -> anyhow::Result<Vec<EvalRecord>> {
    let text = std::fs::read_to_string(path)?;
    let mut records = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(line)?);
    }
    Ok(records)
}

/// Check every citation in the dataset against the corpus.
///
/// A citation is valid when it is a canonical section id (anchored child
/// ids are a violation in dataset fields) and resolves to exactly one
/// retrieval document whose `doc_id` equals the id.
pub fn check_grounding(dataset: &[EvalRecord], corpus: &Corpus) -> GroundingReport {
    let mut violations = Vec::new();
    let mut citations = 0usize;

    for record in dataset {
        for cited in &record.ear_sections {
            citations += 1;
            if cited.contains('#') {
                violations.push(GroundingViolation {
                    record_id: record.id.clone(),
                    cited: cited.clone(),
                    reason: "anchored ids are not allowed in dataset citations".into(),
                });
                continue;
            }
            let normalized = match ident::normalize_section_id(cited) {
                Ok(n) => n,
                Err(_) => {
                    violations.push(GroundingViolation {
                        record_id: record.id.clone(),
                        cited: cited.clone(),
                        reason: "not a normalizable section id".into(),
                    });
                    continue;
                }
            };
            if normalized != *cited {
                violations.push(GroundingViolation {
                    record_id: record.id.clone(),
                    cited: cited.clone(),
                    reason: format!("not canonical (expected {normalized})"),
                });
                continue;
            }
            if corpus.doc_by_id(&normalized).is_none() {
                violations.push(GroundingViolation {
                    record_id: record.id.clone(),
                    cited: cited.clone(),
                    reason: "no retrieval document with this doc_id".into(),
                });
            }
        }
    }

    GroundingReport {
        records: dataset.len(),
        citations,
        violations,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    pub records: usize,
    pub covered: usize,
    pub coverage: f64,
    /// cited section id → times it failed to resolve.
    pub missing: BTreeMap<String, usize>,
}

/// Fraction of dataset records whose citations all resolve in the corpus.
pub fn coverage(dataset: &[EvalRecord], corpus: &Corpus) -> CoverageReport {
    let mut covered = 0usize;
    let mut missing: BTreeMap<String, usize> = BTreeMap::new();

    for record in dataset {
        let mut all_resolve = !record.ear_sections.is_empty();
        for cited in &record.ear_sections {
            let resolves = ident::normalize_section_id(cited)
                .ok()
                .and_then(|id| corpus.doc_by_id(&id).map(|_| ()))
                .is_some();
            if !resolves {
                all_resolve = false;
                *missing.entry(cited.clone()).or_default() += 1;
            }
        }
        if all_resolve {
            covered += 1;
        }
    }

    let records = dataset.len();
    CoverageReport {
        records,
        covered,
        coverage: if records == 0 {
            0.0
        } else {
            covered as f64 / records as f64
        },
        missing,
    }
}
