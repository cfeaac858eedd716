//! Shared fixtures for the integration suites.

use std::path::Path;

use governance::sha256_hex;

/// Write an approved three-section snapshot and return its id.
pub fn write_snapshot(dir: &Path) -> String {
    write_snapshot_with(
        dir,
        &[
            (
                "EAR-736.2(b)",
                "General prohibitions on exports without a license from the bureau.",
            ),
            (
                "EAR-744.1",
                "Entity list scope and license review policy for listed parties.",
            ),
            (
                "EAR-772.1",
                "Definitions of terms used throughout the regulations.",
            ),
        ],
    )
}

pub fn write_snapshot_with(dir: &Path, sections: &[(&str, &str)]) -> String {
    let payload: String = sections
        .iter()
        .map(|(id, text)| {
            serde_json::json!({ "section_id": id, "text": text }).to_string() + "\n"
        })
        .collect();
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("snapshot.jsonl"), &payload).unwrap();
    let manifest = serde_json::json!({
        "manifest_version": "offline-snapshot.v1",
        "snapshot_id": "ecfr-2026-06-01",
        "created_at": "2026-06-01T00:00:00Z",
        "source": {
            "owner": "export-admin",
            "upstream": "https://www.ecfr.gov/",
            "approved_by": "compliance",
            "approved_at": "2026-06-02T00:00:00Z"
        },
        "scope": { "titles": ["15"], "parts": ["736", "744", "772"] },
        "payload": {
            "path": "snapshot.jsonl",
            "sha256": sha256_hex(payload.as_bytes()),
            "size_bytes": payload.len()
        }
    });
    std::fs::write(
        dir.join("manifest.json"),
        serde_json::to_vec_pretty(&manifest).unwrap(),
    )
    .unwrap();
    "ecfr-2026-06-01".to_string()
}

/// Validate + build a corpus from a fresh fixture snapshot.
pub fn fixture_corpus(dir: &Path) -> corpus::Corpus {
    write_snapshot(dir);
    let snapshot = corpus::validate_snapshot(dir).unwrap();
    corpus::build_corpus(&snapshot, &corpus::CorpusConfig::default()).unwrap()
}
