//! Offline snapshot validation.
//!
//! A snapshot directory holds `manifest.json` and the JSONL payload it
//! approves. The manifest's `payload.sha256` binds the approval to exact
//! bytes; any divergence is an integrity failure and nothing downstream is
//! built from the snapshot.

use std::fs;
use std::path::{Path, PathBuf};

use governance::sha256_hex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CorpusError;

/// Manifest version accepted by this validator.
pub const OFFLINE_MANIFEST_VERSION: &str = "offline-snapshot.v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSource {
    pub owner: String,
    pub upstream: String,
    pub approved_by: String,
    pub approved_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotScope {
    pub titles: Vec<String>,
    pub parts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub path: String,
    pub sha256: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineSnapshotManifest {
    pub manifest_version: String,
    pub snapshot_id: String,
    pub created_at: String,
    pub source: SnapshotSource,
    pub scope: SnapshotScope,
    pub payload: SnapshotPayload,
}

/// One payload line. Extra fields beyond the contract are carried through
/// to the corpus builder when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub section_id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// The outcome of acceptance checks: a manifest whose hash binding held,
/// plus the parsed payload records in file order.
#[derive(Debug, Clone)]
pub struct ValidatedSnapshot {
    pub dir: PathBuf,
    pub manifest: OfflineSnapshotManifest,
    pub payload_sha256: String,
    pub records: Vec<SnapshotRecord>,
}

/// Run the acceptance checks on a snapshot directory.
///
/// Checks, in order: manifest shape and version, payload size and SHA-256
/// binding, UTF-8 with no BOM, LF-only line endings, and per-line record
/// shape (`section_id` normalizable, `text` non-empty). The first failure
/// wins; no partial state escapes.
pub fn validate_snapshot(dir: &Path) -> Result<ValidatedSnapshot, CorpusError> {
    let manifest_path = dir.join("manifest.json");
    let manifest_bytes =
        fs::read(&manifest_path).map_err(|e| CorpusError::io(&manifest_path, e))?;
    let manifest: OfflineSnapshotManifest = serde_json::from_slice(&manifest_bytes)
        .map_err(|e| CorpusError::InvalidManifest(e.to_string()))?;

    if manifest.manifest_version != OFFLINE_MANIFEST_VERSION {
        return Err(CorpusError::InvalidManifest(format!(
            "unsupported manifest_version {:?}",
            manifest.manifest_version
        )));
    }
    if manifest.snapshot_id.trim().is_empty() {
        return Err(CorpusError::InvalidManifest("empty snapshot_id".into()));
    }
    for (field, value) in [
        ("source.owner", &manifest.source.owner),
        ("source.approved_by", &manifest.source.approved_by),
    ] {
        if value.trim().is_empty() {
            return Err(CorpusError::InvalidManifest(format!("empty {field}")));
        }
    }

    let payload_path = dir.join(&manifest.payload.path);
    let payload_bytes =
        fs::read(&payload_path).map_err(|e| CorpusError::io(&payload_path, e))?;

    let actual_size = payload_bytes.len() as u64;
    if actual_size != manifest.payload.size_bytes {
        return Err(CorpusError::PayloadSizeMismatch {
            expected: manifest.payload.size_bytes,
            actual: actual_size,
        });
    }
    let actual_sha = sha256_hex(&payload_bytes);
    if actual_sha != manifest.payload.sha256.to_ascii_lowercase() {
        return Err(CorpusError::PayloadHashMismatch {
            expected: manifest.payload.sha256.clone(),
            actual: actual_sha,
        });
    }

    let records = parse_payload(&payload_bytes)?;
    info!(
        snapshot_id = %manifest.snapshot_id,
        records = records.len(),
        "snapshot_accepted"
    );
    Ok(ValidatedSnapshot {
        dir: dir.to_path_buf(),
        manifest,
        payload_sha256: actual_sha,
        records,
    })
}

fn parse_payload(bytes: &[u8]) -> Result<Vec<SnapshotRecord>, CorpusError> {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return Err(CorpusError::InvalidPayload {
            line: 1,
            reason: "payload carries a UTF-8 BOM".into(),
        });
    }
    let text = std::str::from_utf8(bytes).map_err(|e| CorpusError::InvalidPayload {
        line: 1,
        reason: format!("payload is not UTF-8: {e}"),
    })?;
    if text.contains('\r') {
        return Err(CorpusError::InvalidPayload {
            line: 1,
            reason: "payload must be LF-only".into(),
        });
    }

    let mut records = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        let record: SnapshotRecord =
            serde_json::from_str(line).map_err(|e| CorpusError::InvalidPayload {
                line: line_no,
                reason: e.to_string(),
            })?;
        if record.text.trim().is_empty() {
            return Err(CorpusError::InvalidPayload {
                line: line_no,
                reason: "empty text".into(),
            });
        }
        if ident::normalize_section_id(&record.section_id).is_err() {
            return Err(CorpusError::InvalidPayload {
                line: line_no,
                reason: format!("section_id {:?} not normalizable", record.section_id),
            });
        }
        records.push(record);
    }
    Ok(records)
}


#[cfg(test)]
mod tests {
    use super::fixtures::{write_snapshot, write_snapshot_raw};
    use super::*;

    #[test]
    fn valid_snapshot_accepted() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(
            dir.path(),
            &[("EAR-736.2", "General prohibitions."), ("EAR-744.1", "Scope.")],
        );
        let snapshot = validate_snapshot(dir.path()).unwrap();
        assert_eq!(snapshot.records.len(), 2);
        assert_eq!(snapshot.manifest.snapshot_id, "ecfr-2026-06-01");
    }

    #[test]
    fn tampered_payload_is_integrity_failure() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(dir.path(), &[("EAR-736.2", "General prohibitions.")]);
        // Flip bytes after approval.
        let payload_path = dir.path().join("snapshot.jsonl");
        let mut bytes = std::fs::read(&payload_path).unwrap();
        bytes[0] ^= 0x01;
        std::fs::write(&payload_path, bytes).unwrap();

        let err = validate_snapshot(dir.path()).unwrap_err();
        assert!(matches!(err, CorpusError::PayloadHashMismatch { .. }));
        assert!(err.is_integrity_failure());
    }

    #[test]
    fn size_mismatch_detected_before_hash() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(dir.path(), &[("EAR-736.2", "text")]);
        let payload_path = dir.path().join("snapshot.jsonl");
        let mut bytes = std::fs::read(&payload_path).unwrap();
        bytes.push(b'\n');
        std::fs::write(&payload_path, bytes).unwrap();

        assert!(matches!(
            validate_snapshot(dir.path()).unwrap_err(),
            CorpusError::PayloadSizeMismatch { .. }
        ));
    }

    #[test]
    fn bom_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut payload = vec![0xEF, 0xBB, 0xBF];
        payload.extend_from_slice(br#"{"section_id":"EAR-736.2","text":"t"}"#);
        payload.push(b'\n');
        write_snapshot_raw(dir.path(), &payload);
        assert!(matches!(
            validate_snapshot(dir.path()).unwrap_err(),
            CorpusError::InvalidPayload { line: 1, .. }
        ));
    }

    #[test]
    fn crlf_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot_raw(
            dir.path(),
            b"{\"section_id\":\"EAR-736.2\",\"text\":\"t\"}\r\n",
        );
        assert!(matches!(
            validate_snapshot(dir.path()).unwrap_err(),
            CorpusError::InvalidPayload { .. }
        ));
    }

    #[test]
    fn empty_text_rejected_with_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let payload = concat!(
            "{\"section_id\":\"EAR-736.2\",\"text\":\"ok\"}\n",
            "{\"section_id\":\"EAR-744.1\",\"text\":\"  \"}\n",
        );
        write_snapshot_raw(dir.path(), payload.as_bytes());
        match validate_snapshot(dir.path()).unwrap_err() {
            CorpusError::InvalidPayload { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unnormalizable_section_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot_raw(
            dir.path(),
            b"{\"section_id\":\"Part Seven\",\"text\":\"t\"}\n",
        );
        assert!(matches!(
            validate_snapshot(dir.path()).unwrap_err(),
            CorpusError::InvalidPayload { .. }
        ));
    }

    #[test]
    fn wrong_manifest_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(dir.path(), &[("EAR-736.2", "t")]);
        let manifest_path = dir.path().join("manifest.json");
        let text = std::fs::read_to_string(&manifest_path)
            .unwrap()
            .replace("offline-snapshot.v1", "offline-snapshot.v9");
        std::fs::write(&manifest_path, text).unwrap();
        assert!(matches!(
            validate_snapshot(dir.path()).unwrap_err(),
            CorpusError::InvalidManifest(_)
        ));
    }
}
