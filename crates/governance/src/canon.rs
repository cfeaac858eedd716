//! Canonical JSON serialization + SHA-256 helpers.
//!
//! Hashes are always computed over canonical bytes: stable key ordering,
//! no whitespace, UTF-8. Pretty-printing a record changes its bytes but not
//! its identity, so nothing here ever pretty-prints.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Serialize to canonical JSON bytes: keys sorted recursively, compact form.
pub fn canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let v = serde_json::to_value(value)?;
    serde_json::to_vec(&sort_value(v))
}

/// Hex SHA-256 of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn sort_value(v: Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut out = serde_json::Map::new();
            for (k, v) in entries {
                out.insert(k, sort_value(v));
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(sort_value).collect()),
        other => other,
    }
}
