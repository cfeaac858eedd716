//! Append-only JSONL audit ledger with hash chaining.
//!
//! Each record carries a monotonic `seq`, the previous record's hash, and
//! `entry_hash = SHA256(prev_hash ‖ canonical_json(body))` where the body is
//! the record minus `entry_hash` and `hmac`. An optional HMAC over
//! `entry_hash`, keyed separately from the ledger file, detects out-of-band
//! rewrites even when the attacker recomputes the chain.
//!
//! The ledger is the only globally serialized resource in the pipeline:
//! appends go through one `&mut` writer.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::canon::canonical_json_bytes;
use crate::redact::redact_value;

type HmacSha256 = Hmac<Sha256>;

const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Audit event kinds. Serialized in snake_case; the orchestrator enforces
/// the per-run-scope required set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    RunStarted,
    RunCompleted,
    RunFailed,
    StepFailed,
    SnapshotSelected,
    IndexSelected,
    RemoteLlmPolicyDecision,
    PolicyDecision,
    CorpusBuilt,
    KgEmitted,
    IntegrityChecked,
    IndexBuilt,
    QueryAnswered,
    QueryRefused,
    GcPlanned,
    GcApplied,
    CacheRecorded,
    LedgerRotated,
}

/// One ledger record as it appears on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: u64,
    pub ts: String,
    pub actor: String,
    pub roles: Vec<String>,
    pub event: AuditEventKind,
    pub payload: Value,
    pub prev_hash: String,
    pub entry_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hmac: Option<String>,
}

// The hashed body: every field except entry_hash and hmac.
#[derive(Serialize)]
struct HashBody<'a> {
    seq: u64,
    ts: &'a str,
    actor: &'a str,
    roles: &'a [String],
    event: &'a AuditEventKind,
    payload: &'a Value,
    prev_hash: &'a str,
}

fn compute_entry_hash(
    prev_hash: &str,
    seq: u64,
    ts: &str,
    actor: &str,
    roles: &[String],
    event: &AuditEventKind,
    payload: &Value,
) -> Result<String, AuditError> {
    let body = HashBody {
        seq,
        ts,
        actor,
        roles,
        event,
        payload,
        prev_hash,
    };
    let body_bytes = canonical_json_bytes(&body)?;
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(&body_bytes);
    Ok(hex::encode(hasher.finalize()))
}

fn compute_hmac(key: &[u8], entry_hash: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(entry_hash.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Append-only writer over a JSONL ledger file.
pub struct AuditLedger {
    path: PathBuf,
    file: File,
    next_seq: u64,
    last_hash: String,
    hmac_key: Option<Vec<u8>>,
}

impl AuditLedger {
    /// Open (or create) a ledger, recovering `seq` and the chain head from
    /// any existing records. Opening does not verify the whole chain; run
    /// [`verify_ledger`] for that.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        Self::open_with_key(path, None)
    }

    /// Open with an HMAC continuity key stored separately from the ledger.
    pub fn open_with_key(
        path: impl AsRef<Path>,
        hmac_key: Option<Vec<u8>>,
    ) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        let (next_seq, last_hash) = match File::open(&path) {
            Ok(f) => {
                let mut next_seq = 0;
                let mut last_hash = GENESIS_HASH.to_string();
                for line in BufReader::new(f).lines() {
                    let line = line?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    let entry: AuditEntry = serde_json::from_str(&line)?;
                    next_seq = entry.seq + 1;
                    last_hash = entry.entry_hash;
                }
                (next_seq, last_hash)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (0, GENESIS_HASH.to_string()),
            Err(e) => return Err(e.into()),
        };
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file,
            next_seq,
            last_hash,
            hmac_key,
        })
    }

    /// Append one event. The payload runs through the redaction pass before
    /// it is hashed or written; secrets never reach the chain.
    pub fn append(
        &mut self,
        actor: &str,
        roles: &[String],
        event: AuditEventKind,
        payload: Value,
    ) -> Result<AuditEntry, AuditError> {
        let payload = redact_value(&payload);
        let seq = self.next_seq;
        let ts = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true);
        let prev_hash = self.last_hash.clone();
        let entry_hash =
            compute_entry_hash(&prev_hash, seq, &ts, actor, roles, &event, &payload)?;
        let hmac = self
            .hmac_key
            .as_deref()
            .map(|key| compute_hmac(key, &entry_hash));
        let entry = AuditEntry {
            seq,
            ts,
            actor: actor.to_string(),
            roles: roles.to_vec(),
            event,
            payload,
            prev_hash,
            entry_hash: entry_hash.clone(),
            hmac,
        };
        let line = serde_json::to_string(&entry)?;
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")?;
        self.file.flush()?;
        self.next_seq = seq + 1;
        self.last_hash = entry_hash;
        tracing::debug!(seq, event = ?entry.event, "audit_appended");
        Ok(entry)
    }

    /// Close this ledger with a terminal `ledger_rotated` entry, move the
    /// file to `archive_path`, and start a fresh file whose chain is seeded
    /// by the terminal hash. Continuity is preserved across files: the first
    /// entry of the successor carries the archived head as `prev_hash`.
    pub fn rotate(
        &mut self,
        actor: &str,
        roles: &[String],
        archive_path: impl AsRef<Path>,
    ) -> Result<AuditEntry, AuditError> {
        let archive_path = archive_path.as_ref();
        let terminal = self.append(
            actor,
            roles,
            AuditEventKind::LedgerRotated,
            serde_json::json!({ "archive": archive_path.file_name().and_then(|n| n.to_str()) }),
        )?;
        std::fs::rename(&self.path, archive_path)?;
        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        Ok(terminal)
    }

    pub fn last_hash(&self) -> &str {
        &self.last_hash
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Chain verdict for one ledger file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ChainStatus {
    Ok,
    Broken { line: usize, reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub entries: usize,
    pub last_hash: String,
    pub chain: ChainStatus,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        matches!(self.chain, ChainStatus::Ok)
    }
}

/// Walk a ledger file and report the first broken line, if any.
///
/// Reasons: `malformed`, `seq_gap`, `prev_hash_mismatch`,
/// `chain_hash_mismatch`, `hmac_mismatch`. Lines are 1-based.
pub fn verify_ledger(
    path: impl AsRef<Path>,
    hmac_key: Option<&[u8]>,
) -> Result<VerifyReport, AuditError> {
    let file = File::open(path)?;
    let mut expected_prev = GENESIS_HASH.to_string();
    let mut expected_seq = 0u64;
    let mut entries = 0usize;

    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line_no = idx + 1;
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: AuditEntry = match serde_json::from_str(&line) {
            Ok(e) => e,
            Err(_) => return Ok(broken(entries, expected_prev, line_no, "malformed")),
        };
        if entry.seq != expected_seq {
            return Ok(broken(entries, expected_prev, line_no, "seq_gap"));
        }
        if entry.prev_hash != expected_prev {
            return Ok(broken(entries, expected_prev, line_no, "prev_hash_mismatch"));
        }
        let computed = compute_entry_hash(
            &entry.prev_hash,
            entry.seq,
            &entry.ts,
            &entry.actor,
            &entry.roles,
            &entry.event,
            &entry.payload,
        )?;
        if computed != entry.entry_hash {
            return Ok(broken(entries, expected_prev, line_no, "chain_hash_mismatch"));
        }
        if let Some(key) = hmac_key {
            let expected_mac = compute_hmac(key, &entry.entry_hash);
            if entry.hmac.as_deref() != Some(expected_mac.as_str()) {
                return Ok(broken(entries, expected_prev, line_no, "hmac_mismatch"));
            }
        }
        expected_prev = entry.entry_hash;
        expected_seq = entry.seq + 1;
        entries += 1;
    }

    Ok(VerifyReport {
        entries,
        last_hash: expected_prev,
        chain: ChainStatus::Ok,
    })
}

fn broken(entries: usize, last_hash: String, line: usize, reason: &str) -> VerifyReport {
    VerifyReport {
        entries,
        last_hash,
        chain: ChainStatus::Broken {
            line,
            reason: reason.to_string(),
        },
    }
}
