//! End-to-end job sequencing with the exit-code contract.
//!
//! Step order is fixed: snapshot-validate → corpus-build → corpus-validate
//! → kg-emit → kg-validate → baseline-compare → index-rebuild →
//! eval-harness. A failing step short-circuits everything downstream; the
//! summary still lists the skipped steps so CI output has a stable shape.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use corpus::{build_corpus, validate_corpus, validate_snapshot, write_corpus, CorpusConfig};
use governance::AuditEventKind;
use index::{Embedder, HashEmbedder, SidecarSnapshot, VectorIndex};
use kg::{builtin_shapes, write_kg, EmitConfig, IntegrityGate};
use rag::{RagPipeline, RagRequest, RetrievalProfile, StaticGenerator};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::context::AppContext;
use crate::eval::{check_grounding, load_dataset};

/// Exit codes for the CI wrapper: 0 ok, 2 invalid input, 3 integrity
/// failure, 4 authorization denied, 1 everything else.
pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_INVALID_INPUT: i32 = 2;
pub const EXIT_INTEGRITY: i32 = 3;
pub const EXIT_DENIED: i32 = 4;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub snapshot_dir: PathBuf,
    pub baseline_dir: Option<PathBuf>,
    pub eval_dataset: Option<PathBuf>,
    pub eval_question: Option<String>,
    pub strict: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub name: String,
    pub status: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub steps: Vec<StepOutcome>,
    pub exit_code: i32,
    pub provenance: Value,
}

const STEP_NAMES: [&str; 8] = [
    "snapshot-validate",
    "corpus-build",
    "corpus-validate",
    "kg-emit",
    "kg-validate",
    "baseline-compare",
    "index-rebuild",
    "eval-harness",
];

struct StepTracker {
    steps: Vec<StepOutcome>,
}

impl StepTracker {
    fn new() -> Self {
        Self { steps: Vec::new() }
    }

    fn record<T>(
        &mut self,
        name: &str,
        result: Result<T, anyhow::Error>,
        started: Instant,
    ) -> Result<T, anyhow::Error> {
        let duration_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(value) => {
                info!(step = name, duration_ms, "step_ok");
                self.steps.push(StepOutcome {
                    name: name.to_string(),
                    status: "ok".to_string(),
                    duration_ms,
                });
                Ok(value)
            }
            Err(err) => {
                error!(step = name, duration_ms, error = %err, "step_failed");
                self.steps.push(StepOutcome {
                    name: name.to_string(),
                    status: "failed".to_string(),
                    duration_ms,
                });
                Err(err)
            }
        }
    }

    fn skip_remaining(&mut self) {
        for name in STEP_NAMES {
            if !self.steps.iter().any(|s| s.name == name) {
                self.steps.push(StepOutcome {
                    name: name.to_string(),
                    status: "skipped".to_string(),
                    duration_ms: 0,
                });
            }
        }
    }
}

/// Run the full pipeline. Never panics on pipeline failure; the summary's
/// exit code is the contract.
pub async fn run_pipeline(ctx: &AppContext, opts: &RunOptions) -> RunSummary {
    let run_id = uuid::Uuid::new_v4().to_string();
    let mut tracker = StepTracker::new();
    let mut provenance = json!({ "run_id": run_id });

    let _ = ctx.audit(
        AuditEventKind::RunStarted,
        json!({ "run_id": run_id, "snapshot_dir": opts.snapshot_dir.file_name().and_then(|n| n.to_str()) }),
    );

    let result = run_steps(ctx, opts, &mut tracker, &mut provenance).await;
    let exit_code = match result {
        Ok(()) => {
            let _ = ctx.audit(AuditEventKind::RunCompleted, json!({ "run_id": run_id }));
            EXIT_OK
        }
        Err(err) => {
            tracker.skip_remaining();
            let code = classify_exit(&err);
            let _ = ctx.audit(
                AuditEventKind::RunFailed,
                json!({ "run_id": run_id, "error": err.to_string(), "exit_code": code }),
            );
            code
        }
    };

    RunSummary {
        run_id,
        steps: tracker.steps,
        exit_code,
        provenance,
    }
}

async fn run_steps(
    ctx: &AppContext,
    opts: &RunOptions,
    tracker: &mut StepTracker,
    provenance: &mut Value,
) -> anyhow::Result<()> {
    // snapshot-validate
    let started = Instant::now();
    let snapshot = tracker.record(
        "snapshot-validate",
        validate_snapshot(&opts.snapshot_dir).map_err(Into::into),
        started,
    )?;
    ctx.audit(
        AuditEventKind::SnapshotSelected,
        json!({
            "snapshot_id": snapshot.manifest.snapshot_id,
            "payload_sha256": snapshot.payload_sha256,
        }),
    )?;
    provenance["snapshot_id"] = json!(snapshot.manifest.snapshot_id);
    provenance["snapshot_sha256"] = json!(snapshot.payload_sha256);

    // corpus-build
    let started = Instant::now();
    let corpus = tracker.record(
        "corpus-build",
        build_corpus(&snapshot, &CorpusConfig::default())
            .and_then(|c| write_corpus(&c, &ctx.corpus_dir()).map(|()| c))
            .map_err(Into::into),
        started,
    )?;
    ctx.audit(
        AuditEventKind::CorpusBuilt,
        json!({ "corpus_digest": corpus.manifest.corpus_digest, "doc_count": corpus.docs.len() }),
    )?;
    provenance["corpus_digest"] = json!(corpus.manifest.corpus_digest);

    // corpus-validate
    let started = Instant::now();
    tracker.record(
        "corpus-validate",
        validate_corpus(&ctx.corpus_dir(), opts.strict)
            .map(|_| ())
            .map_err(Into::into),
        started,
    )?;

    // kg-emit + kg-validate (the gate also reruns emission for the
    // determinism check) + baseline-compare
    let started = Instant::now();
    let kg_snapshot = tracker.record(
        "kg-emit",
        kg::emit_kg(&corpus, &[], &EmitConfig::from_env()).map_err(Into::into),
        started,
    )?;
    ctx.audit(
        AuditEventKind::KgEmitted,
        json!({ "kg_digest": kg_snapshot.digest, "triples": kg_snapshot.triples.len() }),
    )?;
    provenance["kg_digest"] = json!(kg_snapshot.digest);
    provenance["inputs_hash"] = json!(kg_snapshot.manifest.inputs_hash);

    let started = Instant::now();
    let mut gate = IntegrityGate::new(builtin_shapes());
    if let Some(baseline) = &opts.baseline_dir {
        gate = gate.with_baseline(baseline);
    }
    let (kg_snapshot, outcome) = tracker.record(
        "kg-validate",
        gate.run(&corpus, &[], &EmitConfig::from_env())
            .map_err(Into::into),
        started,
    )?;
    ctx.audit(
        AuditEventKind::IntegrityChecked,
        json!({ "kg_digest": outcome.digest, "checks": outcome.checks.len() }),
    )?;
    write_kg(&kg_snapshot, &ctx.kg_dir())?;

    // baseline-compare ran inside the gate; surface it as its own step so
    // the summary shape matches the contract.
    let baseline_status = if opts.baseline_dir.is_some() { "ok" } else { "skipped" };
    tracker.steps.push(StepOutcome {
        name: "baseline-compare".to_string(),
        status: baseline_status.to_string(),
        duration_ms: 0,
    });

    // index-rebuild
    let started = Instant::now();
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::default());
    let index = tracker.record(
        "index-rebuild",
        {
            let index = VectorIndex::build(
                &corpus,
                SidecarSnapshot {
                    snapshot_id: snapshot.manifest.snapshot_id.clone(),
                    snapshot_sha256: snapshot.payload_sha256.clone(),
                },
                embedder.as_ref(),
                &EmitConfig::from_env().issued_at(),
            );
            index.write(&ctx.index_dir()).map(|()| index).map_err(Into::into)
        },
        started,
    )?;
    let sidecar_hash = index.sidecar().content_hash()?;
    ctx.audit(
        AuditEventKind::IndexSelected,
        json!({
            "sidecar_hash": sidecar_hash,
            "embedding_model": index.sidecar().embedding_model,
            "doc_count": index.len(),
        }),
    )?;
    provenance["embedding_model"] = json!(index.sidecar().embedding_model);
    provenance["sidecar_hash"] = json!(sidecar_hash);

    // eval-harness: remote generation is policy-denied in the offline
    // pipeline, so the harness runs the deterministic generator.
    let started = Instant::now();
    tracker.record(
        "eval-harness",
        run_eval(ctx, opts, &corpus, Arc::new(index), embedder, &kg_snapshot.digest).await,
        started,
    )?;
    Ok(())
}

async fn run_eval(
    ctx: &AppContext,
    opts: &RunOptions,
    corpus: &corpus::Corpus,
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    kg_digest: &str,
) -> anyhow::Result<()> {
    ctx.audit(
        AuditEventKind::RemoteLlmPolicyDecision,
        json!({ "decision": "deny", "generator": "static.v1", "reason": "offline pipeline" }),
    )?;

    if let Some(dataset_path) = &opts.eval_dataset {
        let dataset = load_dataset(dataset_path)?;
        let report = check_grounding(&dataset, corpus);
        if !report.is_ok() {
            anyhow::bail!(
                "grounding check failed: {} violations over {} citations",
                report.violations.len(),
                report.citations
            );
        }
    }

    let question = opts
        .eval_question
        .clone()
        .unwrap_or_else(|| "Is an export license required for items on the entity list?".to_string());
    let pipeline = RagPipeline::new(
        index,
        Arc::new(corpus.clone()),
        embedder,
        Arc::new(StaticGenerator::default()),
        RetrievalProfile::from_env(),
        kg_digest,
    )?;
    let answer = pipeline
        .query(&RagRequest {
            question,
            top_k: 5,
        })
        .await?;

    match &answer.refusal_reason {
        Some(reason) => ctx.audit(
            AuditEventKind::QueryRefused,
            json!({ "refusal_reason": reason }),
        )?,
        None => ctx.audit(
            AuditEventKind::QueryAnswered,
            json!({
                "label": answer.label,
                "citations": answer.citations.len(),
                "grounded": answer.grounded,
            }),
        )?,
    }
    Ok(())
}

fn classify_exit(err: &anyhow::Error) -> i32 {
    if let Some(corpus_err) = err.downcast_ref::<corpus::CorpusError>() {
        return if corpus_err.is_integrity_failure() {
            EXIT_INTEGRITY
        } else {
            EXIT_INVALID_INPUT
        };
    }
    if let Some(kg_err) = err.downcast_ref::<kg::KgError>() {
        return match kg_err {
            kg::KgError::IntegrityFailure(_)
            | kg::KgError::BaselineDrift { .. }
            | kg::KgError::ShapesVersionMismatch { .. } => EXIT_INTEGRITY,
            kg::KgError::ContractViolation(_) | kg::KgError::Id(_) => EXIT_INVALID_INPUT,
            _ => EXIT_FAILURE,
        };
    }
    if err.to_string().contains("authorization denied") {
        return EXIT_DENIED;
    }
    EXIT_FAILURE
}

#[cfg(test)]
mod tests {
    use super::*;
    use governance::{verify_ledger, Role};

    fn write_fixture_snapshot(dir: &std::path::Path) {
        let payload = concat!(
            "{\"section_id\":\"EAR-736.2\",\"text\":\"General prohibitions on exports without a license.\"}\n",
            "{\"section_id\":\"EAR-744.1\",\"text\":\"Entity list scope and license requirements for the listed parties.\"}\n",
            "{\"section_id\":\"EAR-772.1\",\"text\":\"Definitions of terms.\"}\n",
        );
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join("snapshot.jsonl"), payload).unwrap();
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
        std::fs::write(
            dir.join("manifest.json"),
            serde_json::to_vec(&manifest).unwrap(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn full_run_succeeds_and_audits_required_events() {
        let root = tempfile::tempdir().unwrap();
        let snapshot_dir = root.path().join("snapshots").join("2026-06-01");
        write_fixture_snapshot(&snapshot_dir);

        let ctx = AppContext::open(root.path(), "ci", vec![Role::Operator]).unwrap();
        let summary = run_pipeline(
            &ctx,
            &RunOptions {
                snapshot_dir,
                baseline_dir: None,
                eval_dataset: None,
                eval_question: Some("license requirements for the entity list".to_string()),
                strict: true,
            },
        )
        .await;

        assert_eq!(summary.exit_code, EXIT_OK, "steps: {:?}", summary.steps);
        assert_eq!(summary.steps.len(), STEP_NAMES.len());
        assert!(summary.steps.iter().all(|s| s.status != "failed"));

        let audit = std::fs::read_to_string(ctx.audit_path()).unwrap();
        for required in [
            "run_started",
            "snapshot_selected",
            "index_selected",
            "remote_llm_policy_decision",
        ] {
            assert!(audit.contains(required), "missing audit event {required}");
        }
        assert!(audit.contains("query_answered") || audit.contains("query_refused"));
        assert!(verify_ledger(ctx.audit_path(), None).unwrap().is_ok());
    }

    #[tokio::test]
    async fn tampered_snapshot_short_circuits_with_integrity_exit() {
        let root = tempfile::tempdir().unwrap();
        let snapshot_dir = root.path().join("snapshots").join("2026-06-01");
        write_fixture_snapshot(&snapshot_dir);
        // Corrupt after approval.
        let payload_path = snapshot_dir.join("snapshot.jsonl");
        let mut bytes = std::fs::read(&payload_path).unwrap();
        bytes[0] ^= 1;
        std::fs::write(&payload_path, bytes).unwrap();

        let ctx = AppContext::open(root.path(), "ci", vec![Role::Operator]).unwrap();
        let summary = run_pipeline(
            &ctx,
            &RunOptions {
                snapshot_dir,
                baseline_dir: None,
                eval_dataset: None,
                eval_question: None,
                strict: false,
            },
        )
        .await;

        assert_eq!(summary.exit_code, EXIT_INTEGRITY);
        assert_eq!(summary.steps[0].status, "failed");
        assert!(summary.steps[1..].iter().all(|s| s.status == "skipped"));
        // No downstream artifacts.
        assert!(!ctx.corpus_dir().exists());
        assert!(!ctx.kg_dir().join("kg.nq").exists());
    }
}
