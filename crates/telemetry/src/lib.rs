//! Opt-in telemetry spool.
//!
//! Disabled by default; when enabled, events carry only the whitelisted
//! fields below and run through the shared redaction pass before touching
//! disk. There is no network sender in this crate - the spool is a local
//! JSONL directory that operators ship (or GC) on their own terms.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use governance::redact_value;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The complete event vocabulary. Anything not expressible here is not
/// recordable, which is the point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub command: String,
    pub duration_ms: u64,
    pub exit_code: i32,
    pub version: String,
    pub os: String,
    pub device_id: String,
    pub event: String,
    pub ts: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TelemetryEvent {
    pub fn new(command: &str, event: &str, duration_ms: u64, exit_code: i32) -> Self {
        Self {
            command: command.to_string(),
            duration_ms,
            exit_code,
            version: env!("CARGO_PKG_VERSION").to_string(),
            os: std::env::consts::OS.to_string(),
            device_id: String::new(),
            event: event.to_string(),
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub spool_dir: PathBuf,
}

impl TelemetryConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            spool_dir: PathBuf::new(),
        }
    }

    pub fn enabled_at(spool_dir: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            spool_dir: spool_dir.into(),
        }
    }
}

pub struct TelemetrySpool {
    config: TelemetryConfig,
}

impl TelemetrySpool {
    pub fn new(config: TelemetryConfig) -> Self {
        Self { config }
    }

    /// Append one event. A disabled spool is a no-op, never an error.
    pub fn record(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        if !self.config.enabled {
            return Ok(());
        }
        std::fs::create_dir_all(&self.config.spool_dir)?;
        let value = redact_value(&serde_json::to_value(event)?);
        let path = self.config.spool_dir.join("events.jsonl");
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(serde_json::to_string(&value)?.as_bytes())?;
        file.write_all(b"\n")?;
        debug!(event = %event.event, "telemetry_recorded");
        Ok(())
    }

    /// Record a canary probe outcome, the liveness signal operators watch.
    pub fn record_canary(&self, duration_ms: u64, ok: bool) -> Result<(), TelemetryError> {
        let mut event = TelemetryEvent::new("canary", "canary_probe", duration_ms, i32::from(!ok));
        if !ok {
            event = event.with_error("canary probe failed");
        }
        self.record(&event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_spool_writes_nothing() {
        let spool = TelemetrySpool::new(TelemetryConfig::disabled());
        spool
            .record(&TelemetryEvent::new("corpus build", "command_finished", 12, 0))
            .unwrap();
    }

    #[test]
    fn enabled_spool_appends_redacted_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let spool = TelemetrySpool::new(TelemetryConfig::enabled_at(dir.path()));
        let event = TelemetryEvent::new("kg emit", "command_finished", 150, 1)
            .with_error("failed reading /var/lib/earcrawler/kg: contact ops@example.gov");
        spool.record(&event).unwrap();

        let content = std::fs::read_to_string(dir.path().join("events.jsonl")).unwrap();
        assert!(content.contains("kg emit"));
        assert!(content.contains("[path]"));
        assert!(content.contains("[email]"));
        assert!(!content.contains("ops@example.gov"));
    }

    #[test]
    fn canary_records_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let spool = TelemetrySpool::new(TelemetryConfig::enabled_at(dir.path()));
        spool.record_canary(42, false).unwrap();
        let content = std::fs::read_to_string(dir.path().join("events.jsonl")).unwrap();
        assert!(content.contains("canary_probe"));
        assert!(content.contains("\"exit_code\":1"));
    }
}
