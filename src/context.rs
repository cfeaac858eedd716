//! The composition root.
//!
//! One `AppContext` is wired at process start and threaded through every
//! operation; the ledger it owns is the single serialized writer the
//! governance contract requires.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context as _;
use governance::{AuditEventKind, AuditLedger, Decision, PolicyEngine, Role};
use serde_json::Value;
use telemetry::{TelemetryConfig, TelemetrySpool};

pub struct AppContext {
    pub root: PathBuf,
    pub actor: String,
    pub roles: Vec<Role>,
    pub policy: PolicyEngine,
    ledger: Mutex<AuditLedger>,
    pub telemetry: TelemetrySpool,
}

impl AppContext {
    /// Wire a context rooted at `root`. The ledger lives at
    /// `<root>/audit/audit.jsonl`; the HMAC continuity key, when present,
    /// is read from `EARCRAWLER_AUDIT_HMAC_KEY`.
    pub fn open(root: impl Into<PathBuf>, actor: &str, roles: Vec<Role>) -> anyhow::Result<Self> {
        let root = root.into();
        let audit_dir = root.join("audit");
        std::fs::create_dir_all(&audit_dir)
            .with_context(|| format!("creating {}", audit_dir.display()))?;
        let hmac_key = std::env::var("EARCRAWLER_AUDIT_HMAC_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .map(String::into_bytes);
        let ledger = AuditLedger::open_with_key(audit_dir.join("audit.jsonl"), hmac_key)?;

        let telemetry = if std::env::var_os("EARCRAWLER_TELEMETRY").is_some_and(|v| v == "1") {
            TelemetrySpool::new(TelemetryConfig::enabled_at(root.join("spool")))
        } else {
            TelemetrySpool::new(TelemetryConfig::disabled())
        };

        Ok(Self {
            root,
            actor: actor.to_string(),
            roles,
            policy: PolicyEngine::new(),
            ledger: Mutex::new(ledger),
            telemetry,
        })
    }

    pub fn audit_path(&self) -> PathBuf {
        self.root.join("audit").join("audit.jsonl")
    }

    pub fn corpus_dir(&self) -> PathBuf {
        self.root.join("corpus")
    }

    pub fn kg_dir(&self) -> PathBuf {
        self.root.join("kg")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.root.join("index")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(".cache").join("api")
    }

    /// Append an audit event through the serialized writer.
    pub fn audit(&self, event: AuditEventKind, payload: Value) -> anyhow::Result<()> {
        let role_names: Vec<String> = self.roles.iter().map(|r| r.as_str().to_string()).collect();
        self.ledger
            .lock()
            .expect("audit ledger mutex poisoned")
            .append(&self.actor, &role_names, event, payload)?;
        Ok(())
    }

    /// Policy-gate a command. Denials are audited by the engine itself.
    pub fn authorize(&self, command: &str, args: Value) -> anyhow::Result<()> {
        let decision = {
            let mut ledger = self.ledger.lock().expect("audit ledger mutex poisoned");
            self.policy
                .decide(&mut ledger, &self.actor, &self.roles, command, args)?
        };
        match decision {
            Decision::Allow => Ok(()),
            Decision::Deny => anyhow::bail!("authorization denied for {command:?}"),
        }
    }

    /// Run an operation that needs direct access to the serialized ledger
    /// writer (the GC engine appends its own report events).
    pub fn with_ledger<T>(
        &self,
        f: impl FnOnce(&mut AuditLedger) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let mut ledger = self.ledger.lock().expect("audit ledger mutex poisoned");
        f(&mut ledger)
    }

    /// Rotate the audit ledger, archiving the current file beside it.
    pub fn rotate_ledger(&self, archive_name: &str) -> anyhow::Result<String> {
        let archive = self.root.join("audit").join(archive_name);
        let role_names: Vec<String> = self.roles.iter().map(|r| r.as_str().to_string()).collect();
        let terminal = self
            .ledger
            .lock()
            .expect("audit ledger mutex poisoned")
            .rotate(&self.actor, &role_names, &archive)?;
        Ok(terminal.entry_hash)
    }
}

/// Parse `--role` values into the lattice.
pub fn parse_roles(roles: &[String]) -> anyhow::Result<Vec<Role>> {
    if roles.is_empty() {
        return Ok(vec![Role::Operator]);
    }
    roles
        .iter()
        .map(|r| Role::parse(r).map_err(Into::into))
        .collect()
}
