//! Content-addressed response cassettes.
//!
//! A cassette is one recorded HTTP response, stored as canonical JSON at
//! `<cache_dir>/<key>.json` where `key` is the SHA-256 of the request
//! fingerprint. Authorization-bearing headers never enter the fingerprint,
//! and the shared redaction pass scrubs headers and text bodies before the
//! bytes reach disk.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use governance::{redact_text, sha256_hex};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

// Headers excluded from key derivation and scrubbed from stored cassettes.
const SECRET_HEADERS: [&str; 5] = [
    "authorization",
    "proxy-authorization",
    "x-api-key",
    "api-key",
    "subscription-key",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cassette {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// UTF-8 body after redaction; binary bodies use `body_b64` instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_b64: Option<String>,
}

impl Cassette {
    pub fn from_parts(status: u16, headers: &BTreeMap<String, String>, body: &[u8]) -> Self {
        let headers = headers
            .iter()
            .filter(|(name, _)| !is_secret_header(name))
            .map(|(name, value)| (name.to_ascii_lowercase(), redact_text(value)))
            .collect();
        match std::str::from_utf8(body) {
            Ok(text) => Self {
                status,
                headers,
                body: Some(redact_text(text)),
                body_b64: None,
            },
            Err(_) => Self {
                status,
                headers,
                body: None,
                body_b64: Some(base64::engine::general_purpose::STANDARD.encode(body)),
            },
        }
    }

    pub fn body_bytes(&self) -> Result<Vec<u8>, FetchError> {
        if let Some(text) = &self.body {
            return Ok(text.as_bytes().to_vec());
        }
        if let Some(b64) = &self.body_b64 {
            return base64::engine::general_purpose::STANDARD
                .decode(b64)
                .map_err(|e| FetchError::Transport(format!("cassette body: {e}")));
        }
        Ok(Vec::new())
    }
}

/// Disk store for cassettes, keyed by request fingerprint.
pub struct CassetteStore {
    dir: PathBuf,
}

impl CassetteStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Derive the content-address for a request. Headers are sorted by name
    /// and secret-bearing ones are skipped entirely, so a rotated credential
    /// replays against the same cassette.
    pub fn key(method: &str, url: &str, headers: &BTreeMap<String, String>, body: &[u8]) -> String {
        let mut material = Vec::new();
        material.extend_from_slice(method.to_ascii_uppercase().as_bytes());
        material.push(b'\n');
        material.extend_from_slice(url.as_bytes());
        material.push(b'\n');
        for (name, value) in headers {
            if is_secret_header(name) {
                continue;
            }
            material.extend_from_slice(name.to_ascii_lowercase().as_bytes());
            material.push(b':');
            material.extend_from_slice(value.as_bytes());
            material.push(b'\n');
        }
        material.extend_from_slice(body);
        sha256_hex(&material)
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub fn load(&self, key: &str) -> Result<Option<Cassette>, FetchError> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn store(&self, key: &str, cassette: &Cassette) -> Result<PathBuf, FetchError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        fs::write(&path, serde_json::to_vec_pretty(cassette)?)?;
        Ok(path)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn is_secret_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SECRET_HEADERS.contains(&lower.as_str())
}
