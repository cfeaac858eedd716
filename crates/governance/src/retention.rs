//! Retention / garbage-collection engine.
//!
//! GC operates on a closed whitelist of targets under the workspace root
//! (plus the Windows spool directories when their environment roots exist).
//! Planning is side-effect free; applying a plan re-checks every path
//! against the whitelist and refuses to delete anything outside it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audit::{AuditError, AuditEventKind, AuditLedger};

#[derive(Debug, Error)]
pub enum GcError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("path outside retention whitelist: {0}")]
    OutsideWhitelist(PathBuf),
    #[error("unknown gc target: {0:?}")]
    UnknownTarget(String),
    #[error("audit error: {0}")]
    Audit(#[from] AuditError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The closed set of directories GC may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionTarget {
    /// `kg/` snapshots under the workspace root.
    Kg,
    /// `.cache/api/` HTTP cassettes under the workspace root.
    ApiCache,
    /// `%APPDATA%\EarCrawler\spool` (absent outside Windows profiles).
    UserSpool,
    /// `%PROGRAMDATA%\EarCrawler\spool`.
    MachineSpool,
}

impl RetentionTarget {
    pub fn parse(s: &str) -> Result<Self, GcError> {
        match s {
            "kg" => Ok(Self::Kg),
            "api-cache" => Ok(Self::ApiCache),
            "user-spool" => Ok(Self::UserSpool),
            "machine-spool" => Ok(Self::MachineSpool),
            other => Err(GcError::UnknownTarget(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kg => "kg",
            Self::ApiCache => "api-cache",
            Self::UserSpool => "user-spool",
            Self::MachineSpool => "machine-spool",
        }
    }

    /// Resolve to a concrete directory. Spool targets resolve only when
    /// their platform root is present in the environment.
    pub fn resolve(&self, root: &Path) -> Option<PathBuf> {
        match self {
            Self::Kg => Some(root.join("kg")),
            Self::ApiCache => Some(root.join(".cache").join("api")),
            Self::UserSpool => std::env::var_os("APPDATA")
                .map(|base| PathBuf::from(base).join("EarCrawler").join("spool")),
            Self::MachineSpool => std::env::var_os("PROGRAMDATA")
                .map(|base| PathBuf::from(base).join("EarCrawler").join("spool")),
        }
    }
}

/// Per-target retention limits. `None` disables a rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub max_age_days: Option<u64>,
    pub max_total_bytes: Option<u64>,
    pub max_file_bytes: Option<u64>,
    pub keep_last: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcPlannedDeletion {
    pub target: RetentionTarget,
    pub path: PathBuf,
    pub bytes: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GcPlan {
    pub deletions: Vec<GcPlannedDeletion>,
    pub reclaimed_bytes: u64,
}

pub struct RetentionEngine {
    root: PathBuf,
    targets: Vec<(RetentionTarget, RetentionPolicy)>,
}

struct Candidate {
    path: PathBuf,
    bytes: u64,
    modified: SystemTime,
}

impl RetentionEngine {
    pub fn new(root: impl Into<PathBuf>, targets: Vec<(RetentionTarget, RetentionPolicy)>) -> Self {
        Self {
            root: root.into(),
            targets,
        }
    }

    /// Compute the deletion plan without touching anything.
    pub fn plan(&self) -> Result<GcPlan, GcError> {
        let now = SystemTime::now();
        let mut plan = GcPlan::default();
        for (target, policy) in &self.targets {
            let Some(dir) = target.resolve(&self.root) else {
                continue;
            };
            if !dir.is_dir() {
                continue;
            }
            let mut files = collect_files(&dir)?;
            // Newest first; the first `keep_last` files are immune.
            files.sort_by(|a, b| b.modified.cmp(&a.modified));
            let protected = policy.keep_last.unwrap_or(0).min(files.len());
            let (kept, eligible) = files.split_at(protected);

            let mut survivors: u64 = kept.iter().map(|f| f.bytes).sum();
            let mut doomed: Vec<(usize, &'static str)> = Vec::new();
            for (i, file) in eligible.iter().enumerate() {
                if let Some(max_file) = policy.max_file_bytes {
                    if file.bytes > max_file {
                        doomed.push((i, "max_file_bytes"));
                        continue;
                    }
                }
                if let Some(days) = policy.max_age_days {
                    let age = now
                        .duration_since(file.modified)
                        .unwrap_or(Duration::ZERO);
                    if age > Duration::from_secs(days * 24 * 60 * 60) {
                        doomed.push((i, "max_age_days"));
                        continue;
                    }
                }
                survivors += file.bytes;
            }
            if let Some(max_total) = policy.max_total_bytes {
                // Evict oldest survivors until the target fits its budget.
                for (i, file) in eligible.iter().enumerate().rev() {
                    if survivors <= max_total {
                        break;
                    }
                    if doomed.iter().any(|(j, _)| *j == i) {
                        continue;
                    }
                    doomed.push((i, "max_total_bytes"));
                    survivors -= file.bytes;
                }
            }
            for (i, reason) in doomed {
                let file = &eligible[i];
                plan.reclaimed_bytes += file.bytes;
                plan.deletions.push(GcPlannedDeletion {
                    target: *target,
                    path: file.path.clone(),
                    bytes: file.bytes,
                    reason: reason.to_string(),
                });
            }
        }
        plan.deletions.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(plan)
    }

    /// Apply a plan: every path is re-verified against the whitelist, then
    /// deleted; a timestamped report is written under `gc-reports/` and an
    /// audit event appended. A single out-of-whitelist path aborts the whole
    /// apply before any deletion happens.
    pub fn apply(&self, plan: &GcPlan, ledger: &mut AuditLedger) -> Result<PathBuf, GcError> {
        for deletion in &plan.deletions {
            self.check_whitelisted(&deletion.path)?;
        }
        for deletion in &plan.deletions {
            fs::remove_file(&deletion.path)?;
            tracing::info!(path = %deletion.path.display(), reason = %deletion.reason, "gc_deleted");
        }

        let report_dir = self.root.join("gc-reports");
        fs::create_dir_all(&report_dir)?;
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
        let report_path = report_dir.join(format!("gc-{stamp}.json"));
        fs::write(&report_path, serde_json::to_vec_pretty(plan)?)?;

        ledger.append(
            "gc",
            &["maintainer".to_string()],
            AuditEventKind::GcApplied,
            serde_json::json!({
                "deletions": plan.deletions.len(),
                "reclaimed_bytes": plan.reclaimed_bytes,
            }),
        )?;
        Ok(report_path)
    }

    fn check_whitelisted(&self, path: &Path) -> Result<(), GcError> {
        if path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(GcError::OutsideWhitelist(path.to_path_buf()));
        }
        let allowed = self.targets.iter().any(|(target, _)| {
            target
                .resolve(&self.root)
                .is_some_and(|dir| path.starts_with(&dir))
        });
        if allowed {
            Ok(())
        } else {
            Err(GcError::OutsideWhitelist(path.to_path_buf()))
        }
    }
}

fn collect_files(dir: &Path) -> Result<Vec<Candidate>, GcError> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(&current)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if meta.is_dir() {
                stack.push(entry.path());
            } else {
                out.push(Candidate {
                    path: entry.path(),
                    bytes: meta.len(),
                    modified: meta.modified()?,
                });
            }
        }
    }
    Ok(out)
}
