//! EarCrawler CLI - orchestrator-facing contract surface.
//!
//! Every subcommand is policy-gated, prints a JSON summary to stdout, and
//! exits non-zero on contract violation. Human-readable detail goes to
//! stderr through tracing; stdout stays machine-parseable.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};

use earcrawler::context::{parse_roles, AppContext};
use earcrawler::orchestrator::{
    run_pipeline, RunOptions, EXIT_DENIED, EXIT_FAILURE, EXIT_INTEGRITY, EXIT_INVALID_INPUT,
    EXIT_OK,
};

use governance::{
    verify_ledger, Decision, GcPlan, RetentionEngine, RetentionPolicy, RetentionTarget,
};
use index::{Embedder, HashEmbedder, VectorIndex};
use kg::{builtin_shapes, EmitConfig, IntegrityGate, SparqlClient};
use rag::{RagPipeline, RagRequest, RetrievalProfile, StaticGenerator};

#[derive(Parser)]
#[command(name = "earcrawler", version, about = "Regulatory-knowledge pipeline")]
struct Cli {
    /// Workspace root holding corpus/, kg/, index/, audit/, .cache/.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Acting identity recorded in the audit ledger.
    #[arg(long, global = true, default_value = "operator")]
    actor: String,

    /// Roles held by the actor (reader|operator|maintainer|admin).
    #[arg(long = "role", global = true)]
    roles: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate an offline snapshot directory against its manifest.
    SnapshotValidate {
        #[arg(long)]
        dir: PathBuf,
    },
    /// Corpus operations.
    Corpus {
        #[command(subcommand)]
        command: CorpusCommand,
    },
    /// Knowledge-graph operations.
    Kg {
        #[command(subcommand)]
        command: KgCommand,
    },
    /// Integrity gate over the current corpus.
    Integrity {
        #[command(subcommand)]
        command: IntegrityCommand,
    },
    /// Bundle exports.
    Bundle {
        #[command(subcommand)]
        command: BundleCommand,
    },
    /// Evaluation harness.
    Eval {
        #[command(subcommand)]
        command: EvalCommand,
    },
    /// Retention garbage collection over the whitelisted footprint.
    Gc(GcArgs),
    /// Audit ledger operations.
    Audit {
        #[command(subcommand)]
        command: AuditCommand,
    },
    /// Policy introspection.
    Policy {
        #[command(subcommand)]
        command: PolicyCommand,
    },
    /// End-to-end pipeline run.
    Run {
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long)]
        baseline: Option<PathBuf>,
        #[arg(long)]
        eval_dataset: Option<PathBuf>,
        #[arg(long)]
        eval_question: Option<String>,
    },
}

#[derive(Subcommand)]
enum CorpusCommand {
    /// Build the canonical corpus from an approved snapshot.
    Build {
        #[arg(long)]
        snapshot: PathBuf,
    },
    /// Validate the current corpus artifacts.
    Validate {
        #[arg(long)]
        strict: bool,
    },
    /// Summarize the current corpus snapshot (manifest + checksums).
    Snapshot,
}

#[derive(Subcommand)]
enum KgCommand {
    /// Emit RDF through the integrity gate and write the snapshot.
    Emit {
        #[arg(long)]
        baseline: Option<PathBuf>,
        /// Screening-list sources to mint as entities (e.g. EL, SDN).
        /// Pulls replay from cassettes unless ALLOW_RECORD is set.
        #[arg(long = "csl-source")]
        csl_sources: Vec<String>,
    },
    /// Load the emitted snapshot into the SPARQL endpoint.
    Load {
        #[arg(long)]
        endpoint: String,
    },
    /// Serve the read-only HTTP facade.
    Serve {
        #[arg(long)]
        endpoint: Option<String>,
    },
    /// Run an allowlisted query template against the endpoint.
    Query {
        #[arg(long)]
        endpoint: String,
        #[arg(long)]
        template: String,
        #[arg(long)]
        iri: String,
    },
}

#[derive(Subcommand)]
enum IntegrityCommand {
    /// Run the offline integrity gate (shapes, provenance, determinism,
    /// optional baseline drift).
    Check {
        #[arg(long)]
        baseline: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum BundleCommand {
    /// Export retrieval and policy profiles as a JSON bundle.
    ExportProfiles {
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum EvalCommand {
    /// Federal Register dataset coverage against the corpus.
    FrCoverage {
        #[arg(long)]
        dataset: PathBuf,
    },
    /// Run a question through the RAG pipeline with the offline generator.
    RunRag {
        #[arg(long)]
        question: String,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },
    /// Enforce the citation-grounding invariant over a dataset.
    CheckGrounding {
        #[arg(long)]
        dataset: PathBuf,
    },
}

#[derive(Args)]
struct GcArgs {
    /// Print the plan without deleting.
    #[arg(long, conflicts_with = "apply")]
    dry_run: bool,
    /// Delete per the plan and write an audit report.
    #[arg(long)]
    apply: bool,
    /// Targets: kg | api-cache | user-spool | machine-spool.
    #[arg(long = "target", required = true)]
    targets: Vec<String>,
    #[arg(long)]
    max_age_days: Option<u64>,
    #[arg(long)]
    max_total_bytes: Option<u64>,
    #[arg(long)]
    max_file_bytes: Option<u64>,
    #[arg(long)]
    keep_last: Option<usize>,
}

#[derive(Subcommand)]
enum AuditCommand {
    /// Walk the ledger and report the first broken line.
    Verify,
    /// Archive the current ledger and seed a successor.
    Rotate {
        #[arg(long)]
        archive: String,
    },
}

#[derive(Subcommand)]
enum PolicyCommand {
    /// Show the acting identity and effective roles.
    Whoami,
    /// Evaluate a command against the policy table without executing it.
    Test {
        #[arg(long)]
        command: String,
    },
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to start runtime: {err}");
            return ExitCode::from(EXIT_FAILURE as u8);
        }
    };

    let code = runtime.block_on(dispatch(cli));
    ExitCode::from(code.clamp(0, u8::MAX as i32) as u8)
}

async fn dispatch(cli: Cli) -> i32 {
    let roles = match parse_roles(&cli.roles) {
        Ok(roles) => roles,
        Err(err) => return fail(EXIT_INVALID_INPUT, "roles", &err),
    };
    let ctx = match AppContext::open(&cli.root, &cli.actor, roles) {
        Ok(ctx) => ctx,
        Err(err) => return fail(EXIT_FAILURE, "context", &err),
    };

    match cli.command {
        Command::SnapshotValidate { dir } => {
            gated(&ctx, "snapshot-validate", json!({"dir": dir.file_name().and_then(|n| n.to_str())}), || async {
                let snapshot = corpus::validate_snapshot(&dir)?;
                Ok(json!({
                    "snapshot_id": snapshot.manifest.snapshot_id,
                    "payload_sha256": snapshot.payload_sha256,
                    "records": snapshot.records.len(),
                }))
            })
            .await
        }
        Command::Corpus { command } => corpus_command(&ctx, command).await,
        Command::Kg { command } => kg_command(&ctx, command).await,
        Command::Integrity {
            command: IntegrityCommand::Check { baseline },
        } => {
            gated(&ctx, "integrity check", json!({}), || async {
                let corpus = corpus::load_corpus(&ctx.corpus_dir())?;
                let mut gate = IntegrityGate::new(builtin_shapes());
                if let Some(baseline) = &baseline {
                    gate = gate.with_baseline(baseline);
                }
                let (_, outcome) = gate.run(&corpus, &[], &EmitConfig::from_env())?;
                Ok(serde_json::to_value(outcome)?)
            })
            .await
        }
        Command::Bundle {
            command: BundleCommand::ExportProfiles { out },
        } => {
            gated(&ctx, "bundle export-profiles", json!({}), || async {
                let bundle = json!({
                    "retrieval_profile": RetrievalProfile::from_env(),
                    "rate_limits": {
                        "anonymous": { "rpm": 30, "burst": 10 },
                        "keyed": { "rpm": 120, "burst": 20 },
                    },
                    "schema_versions": {
                        "retrieval_corpus": corpus::RETRIEVAL_SCHEMA_VERSION,
                        "kg": kg::KG_SCHEMA_VERSION,
                        "offline_snapshot": corpus::OFFLINE_MANIFEST_VERSION,
                    },
                });
                if let Some(out) = &out {
                    std::fs::write(out, serde_json::to_vec_pretty(&bundle)?)?;
                }
                Ok(bundle)
            })
            .await
        }
        Command::Eval { command } => eval_command(&ctx, command).await,
        Command::Gc(args) => gc_command(&ctx, args).await,
        Command::Audit { command } => audit_command(&ctx, command).await,
        Command::Policy { command } => policy_command(&ctx, command).await,
        Command::Run {
            snapshot,
            baseline,
            eval_dataset,
            eval_question,
        } => {
            if let Err(err) = ctx.authorize("run", json!({})) {
                return fail(EXIT_DENIED, "run", &err);
            }
            let summary = run_pipeline(
                &ctx,
                &RunOptions {
                    snapshot_dir: snapshot,
                    baseline_dir: baseline,
                    eval_dataset,
                    eval_question,
                    strict: std::env::var_os("STRICT_SNAPSHOT").is_some(),
                },
            )
            .await;
            print_summary(&serde_json::to_value(&summary).unwrap_or_default());
            summary.exit_code
        }
    }
}

async fn corpus_command(ctx: &AppContext, command: CorpusCommand) -> i32 {
    match command {
        CorpusCommand::Build { snapshot } => {
            gated(ctx, "corpus build", json!({}), || async {
                let validated = corpus::validate_snapshot(&snapshot)?;
                let built = corpus::build_corpus(&validated, &corpus::CorpusConfig::default())?;
                corpus::write_corpus(&built, &ctx.corpus_dir())?;
                ctx.audit(
                    governance::AuditEventKind::CorpusBuilt,
                    json!({ "corpus_digest": built.manifest.corpus_digest }),
                )?;
                Ok(json!({
                    "corpus_digest": built.manifest.corpus_digest,
                    "doc_count": built.docs.len(),
                }))
            })
            .await
        }
        CorpusCommand::Validate { strict } => {
            gated(ctx, "corpus validate", json!({"strict": strict}), || async {
                let manifest = corpus::validate_corpus(&ctx.corpus_dir(), strict)?;
                Ok(json!({
                    "corpus_digest": manifest.corpus_digest,
                    "doc_count": manifest.doc_count,
                    "source_ref": manifest.source_ref,
                }))
            })
            .await
        }
        CorpusCommand::Snapshot => {
            gated(ctx, "corpus snapshot", json!({}), || async {
                let loaded = corpus::load_corpus(&ctx.corpus_dir())?;
                let checksums =
                    std::fs::read_to_string(ctx.corpus_dir().join(corpus::CHECKSUMS_FILE))?;
                Ok(json!({
                    "manifest": serde_json::to_value(&loaded.manifest)?,
                    "checksums": checksums.lines().collect::<Vec<_>>(),
                }))
            })
            .await
        }
    }
}

async fn kg_command(ctx: &AppContext, command: KgCommand) -> i32 {
    match command {
        KgCommand::Emit {
            baseline,
            csl_sources,
        } => {
            gated(ctx, "kg emit", json!({"csl_sources": &csl_sources}), || async {
                let corpus = corpus::load_corpus(&ctx.corpus_dir())?;
                let entities = if csl_sources.is_empty() {
                    Vec::new()
                } else {
                    let client = fetch::CachedHttpClient::new(fetch::FetchConfig::from_env(
                        ctx.cache_dir(),
                    ))?;
                    let sources: Vec<&str> = csl_sources.iter().map(String::as_str).collect();
                    kg::fetch_entities(&client, &sources).await?
                };
                let mut gate = IntegrityGate::new(builtin_shapes());
                if let Some(baseline) = &baseline {
                    gate = gate.with_baseline(baseline);
                }
                let (snapshot, outcome) = gate.run(&corpus, &entities, &EmitConfig::from_env())?;
                kg::write_kg(&snapshot, &ctx.kg_dir())?;
                ctx.audit(
                    governance::AuditEventKind::KgEmitted,
                    json!({ "kg_digest": snapshot.digest }),
                )?;
                Ok(json!({
                    "kg_digest": snapshot.digest,
                    "graph": snapshot.graph,
                    "triples": snapshot.triples.len(),
                    "checks": outcome.checks.len(),
                }))
            })
            .await
        }
        KgCommand::Load { endpoint } => {
            gated(ctx, "kg load", json!({"endpoint": endpoint}), || async {
                let manifest = kg::load_manifest(&ctx.kg_dir())?;
                let nquads = std::fs::read_to_string(ctx.kg_dir().join("kg.nq"))?;
                let client = sparql_client(ctx, &endpoint)?;
                let graph = ident::graph_iri(&manifest.digest);
                client.load_graph(&graph, &nquads).await?;
                Ok(json!({ "graph": graph, "kg_digest": manifest.digest }))
            })
            .await
        }
        KgCommand::Serve { endpoint } => {
            if let Err(err) = ctx.authorize("kg serve", json!({})) {
                return fail(EXIT_DENIED, "kg serve", &err);
            }
            match serve(ctx, endpoint).await {
                Ok(()) => EXIT_OK,
                Err(err) => fail(EXIT_FAILURE, "kg serve", &err),
            }
        }
        KgCommand::Query {
            endpoint,
            template,
            iri,
        } => {
            gated(ctx, "kg query", json!({"template": template}), || async {
                let manifest = kg::load_manifest(&ctx.kg_dir())?;
                let graph = ident::graph_iri(&manifest.digest);
                let query = kg::render_template(&template, &graph, &iri)?;
                let client = sparql_client(ctx, &endpoint)?;
                let results = client.query(&query).await?;
                Ok(json!({ "template": template, "graph": graph, "results": results }))
            })
            .await
        }
    }
}

async fn eval_command(ctx: &AppContext, command: EvalCommand) -> i32 {
    match command {
        EvalCommand::FrCoverage { dataset } => {
            gated(ctx, "eval fr-coverage", json!({}), || async {
                let records = earcrawler::eval::load_dataset(&dataset)?;
                let corpus = corpus::load_corpus(&ctx.corpus_dir())?;
                let report = earcrawler::eval::coverage(&records, &corpus);
                Ok(serde_json::to_value(report)?)
            })
            .await
        }
        EvalCommand::RunRag { question, top_k } => {
            gated(ctx, "eval run-rag", json!({"top_k": top_k}), || async {
                let corpus = Arc::new(corpus::load_corpus(&ctx.corpus_dir())?);
                let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::default());
                let index = Arc::new(VectorIndex::load(
                    &ctx.index_dir(),
                    &corpus.manifest,
                    embedder.as_ref(),
                )?);
                let kg_digest = kg::load_manifest(&ctx.kg_dir())
                    .map(|m| m.digest)
                    .unwrap_or_default();
                ctx.audit(
                    governance::AuditEventKind::RemoteLlmPolicyDecision,
                    json!({ "decision": "deny", "generator": "static.v1" }),
                )?;
                let pipeline = RagPipeline::new(
                    index,
                    corpus,
                    embedder,
                    Arc::new(StaticGenerator::default()),
                    RetrievalProfile::from_env(),
                    kg_digest,
                )?;
                let answer = pipeline.query(&RagRequest { question, top_k }).await?;
                let event = if answer.refusal_reason.is_some() {
                    governance::AuditEventKind::QueryRefused
                } else {
                    governance::AuditEventKind::QueryAnswered
                };
                ctx.audit(event, json!({ "grounded": answer.grounded }))?;
                Ok(serde_json::to_value(answer.as_ref())?)
            })
            .await
        }
        EvalCommand::CheckGrounding { dataset } => {
            gated(ctx, "eval check-grounding", json!({}), || async {
                let records = earcrawler::eval::load_dataset(&dataset)?;
                let corpus = corpus::load_corpus(&ctx.corpus_dir())?;
                let report = earcrawler::eval::check_grounding(&records, &corpus);
                if !report.is_ok() {
                    let value = serde_json::to_value(&report)?;
                    print_summary(&value);
                    anyhow::bail!("grounding violations: {}", report.violations.len());
                }
                Ok(serde_json::to_value(report)?)
            })
            .await
        }
    }
}

async fn gc_command(ctx: &AppContext, args: GcArgs) -> i32 {
    // --dry-run and --apply conflict at parse time; no flag means dry-run.
    let apply = args.apply && !args.dry_run;
    let command = if apply { "gc apply" } else { "gc plan" };
    let policy = RetentionPolicy {
        max_age_days: args.max_age_days,
        max_total_bytes: args.max_total_bytes,
        max_file_bytes: args.max_file_bytes,
        keep_last: args.keep_last,
    };
    let mut targets = Vec::new();
    for name in &args.targets {
        match RetentionTarget::parse(name) {
            Ok(target) => targets.push((target, policy.clone())),
            Err(err) => return fail(EXIT_INVALID_INPUT, "gc", &err.into()),
        }
    }

    gated(ctx, command, json!({"targets": args.targets}), || async {
        let engine = RetentionEngine::new(&ctx.root, targets);
        let plan: GcPlan = engine.plan()?;
        if apply {
            let report_path =
                ctx.with_ledger(|ledger| engine.apply(&plan, ledger).map_err(Into::into))?;
            Ok(json!({
                "applied": true,
                "deletions": plan.deletions.len(),
                "reclaimed_bytes": plan.reclaimed_bytes,
                "report": report_path.file_name().and_then(|n| n.to_str()),
            }))
        } else {
            Ok(json!({
                "applied": false,
                "plan": serde_json::to_value(&plan)?,
            }))
        }
    })
    .await
}

async fn audit_command(ctx: &AppContext, command: AuditCommand) -> i32 {
    match command {
        AuditCommand::Verify => {
            gated(ctx, "audit verify", json!({}), || async {
                let key = std::env::var("EARCRAWLER_AUDIT_HMAC_KEY").ok();
                let report = verify_ledger(ctx.audit_path(), key.as_deref().map(str::as_bytes))?;
                let value = serde_json::to_value(&report)?;
                if !report.is_ok() {
                    print_summary(&value);
                    anyhow::bail!("audit chain broken");
                }
                Ok(value)
            })
            .await
        }
        AuditCommand::Rotate { archive } => {
            gated(ctx, "audit rotate", json!({"archive": archive}), || async {
                let head = ctx.rotate_ledger(&archive)?;
                Ok(json!({ "archived": archive, "chain_head": head }))
            })
            .await
        }
    }
}

async fn policy_command(ctx: &AppContext, command: PolicyCommand) -> i32 {
    match command {
        PolicyCommand::Whoami => {
            gated(ctx, "policy whoami", json!({}), || async {
                Ok(json!({
                    "actor": ctx.actor,
                    "roles": ctx.roles.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
                }))
            })
            .await
        }
        PolicyCommand::Test { command } => {
            gated(ctx, "policy test", json!({"command": command}), || async {
                let decision = ctx.policy.evaluate(&ctx.roles, &command);
                Ok(json!({
                    "command": command,
                    "decision": decision,
                    "allowed": decision == Decision::Allow,
                }))
            })
            .await
        }
    }
}

/// Start the facade over the current artifacts.
async fn serve(ctx: &AppContext, endpoint: Option<String>) -> anyhow::Result<()> {
    let config = server::FacadeConfig::load()?;
    let corpus = Arc::new(corpus::load_corpus(&ctx.corpus_dir())?);
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::default());
    let index = Arc::new(VectorIndex::load(
        &ctx.index_dir(),
        &corpus.manifest,
        embedder.as_ref(),
    )?);

    let mut state = server::AppState::new(config, corpus.clone(), index.clone(), embedder.clone());

    if let Ok(manifest) = kg::load_manifest(&ctx.kg_dir()) {
        let kg_digest = manifest.digest.clone();
        let pipeline = RagPipeline::new(
            index,
            corpus,
            embedder,
            Arc::new(StaticGenerator::default()),
            RetrievalProfile::from_env(),
            kg_digest.clone(),
        )?;
        let pipeline = if let Some(endpoint) = &endpoint {
            let client = Arc::new(sparql_client(ctx, endpoint)?);
            state = state.with_sparql(client.clone(), manifest);
            Arc::new(pipeline.with_kg(client, ident::graph_iri(&kg_digest)))
        } else {
            Arc::new(pipeline)
        };
        state = state.with_rag(pipeline);
    }

    server::start_server(Arc::new(state)).await
}

fn sparql_client(ctx: &AppContext, endpoint: &str) -> anyhow::Result<SparqlClient> {
    let fetch_config = fetch::FetchConfig::from_env(ctx.cache_dir());
    Ok(SparqlClient::new(
        endpoint,
        fetch::CachedHttpClient::new(fetch_config)?,
    ))
}

/// Authorize, execute, print, and map errors onto the exit-code contract.
async fn gated<F, Fut>(ctx: &AppContext, command: &str, args: Value, f: F) -> i32
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<Value>>,
{
    if let Err(err) = ctx.authorize(command, args) {
        return fail(EXIT_DENIED, command, &err);
    }
    match f().await {
        Ok(summary) => {
            print_summary(&json!({ "command": command, "ok": true, "result": summary }));
            EXIT_OK
        }
        Err(err) => {
            let code = classify(&err);
            fail(code, command, &err)
        }
    }
}

fn classify(err: &anyhow::Error) -> i32 {
    if let Some(e) = err.downcast_ref::<corpus::CorpusError>() {
        return if e.is_integrity_failure() {
            EXIT_INTEGRITY
        } else {
            EXIT_INVALID_INPUT
        };
    }
    if let Some(e) = err.downcast_ref::<kg::KgError>() {
        return match e {
            kg::KgError::IntegrityFailure(_)
            | kg::KgError::BaselineDrift { .. }
            | kg::KgError::ShapesVersionMismatch { .. } => EXIT_INTEGRITY,
            kg::KgError::ContractViolation(_) | kg::KgError::Id(_) => EXIT_INVALID_INPUT,
            _ => EXIT_FAILURE,
        };
    }
    if err.downcast_ref::<ident::IdError>().is_some() {
        return EXIT_INVALID_INPUT;
    }
    if err.to_string().contains("chain broken") || err.to_string().contains("grounding violations")
    {
        return EXIT_INTEGRITY;
    }
    EXIT_FAILURE
}

fn fail(code: i32, command: &str, err: &anyhow::Error) -> i32 {
    print_summary(&json!({
        "command": command,
        "ok": false,
        "exit_code": code,
        "error": governance::redact_text(&err.to_string()),
    }));
    code
}

fn print_summary(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
}
