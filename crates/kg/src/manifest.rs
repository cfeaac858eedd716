//! The `.kgstate` manifest - the source of truth for KG snapshot identity.

use std::fs;
use std::path::Path;

use governance::canonical_json_bytes;
use serde::{Deserialize, Serialize};

use crate::error::KgError;

/// Schema version pinned in both the ontology node and the manifest.
/// Bump whenever the emitted shape of the graph changes.
pub const KG_SCHEMA_VERSION: &str = "ear-kg.v1";

/// Manifest directory under the kg output root.
pub const KGSTATE_DIR: &str = ".kgstate";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KgManifest {
    /// SHA-256 over the canonical N-Quads bytes; the snapshot identity.
    pub digest: String,
    pub schema_version: String,
    /// SHA-256 binding the inputs: corpus digest + entity list + schema.
    pub inputs_hash: String,
    /// Derived from `SOURCE_DATE_EPOCH`, never the wall clock.
    pub created_at: String,
}

pub fn write_manifest(kg_dir: &Path, manifest: &KgManifest) -> Result<(), KgError> {
    let state_dir = kg_dir.join(KGSTATE_DIR);
    fs::create_dir_all(&state_dir)?;
    let mut bytes = canonical_json_bytes(manifest)?;
    bytes.push(b'\n');
    fs::write(state_dir.join("manifest.json"), bytes)?;
    Ok(())
}

pub fn load_manifest(kg_dir: &Path) -> Result<KgManifest, KgError> {
    let bytes = fs::read(kg_dir.join(KGSTATE_DIR).join("manifest.json"))?;
    Ok(serde_json::from_slice(&bytes)?)
}
