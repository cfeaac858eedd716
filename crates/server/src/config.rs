use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Facade configuration.
///
/// Defaults are the contract budgets; deployments can tighten them but the
/// route handlers treat these numbers as ceilings, not suggestions.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FacadeConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// In-flight request ceiling.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Anonymous identities: sustained requests per minute and burst.
    #[serde(default = "default_anon_rpm")]
    pub anon_rpm: u32,
    #[serde(default = "default_anon_burst")]
    pub anon_burst: u32,

    /// Keyed identities.
    #[serde(default = "default_keyed_rpm")]
    pub keyed_rpm: u32,
    #[serde(default = "default_keyed_burst")]
    pub keyed_burst: u32,

    /// Facade API keys. Requests presenting an unknown key are rejected;
    /// requests presenting none run under the anonymous budget.
    #[serde(default)]
    pub api_keys: HashSet<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            timeout_ms: default_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
            max_in_flight: default_max_in_flight(),
            anon_rpm: default_anon_rpm(),
            anon_burst: default_anon_burst(),
            keyed_rpm: default_keyed_rpm(),
            keyed_burst: default_keyed_burst(),
            api_keys: HashSet::new(),
            log_level: default_log_level(),
        }
    }
}

impl FacadeConfig {
    /// Load from an optional `facade` config file with `EARCRAWLER_FACADE`
    /// environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("facade").required(false))
            .add_source(config::Environment::with_prefix("EARCRAWLER_FACADE").separator("__"));
        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.bind_addr, self.port).parse()?)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8088
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_max_body_bytes() -> usize {
    32 * 1024
}

fn default_max_in_flight() -> usize {
    16
}

fn default_anon_rpm() -> u32 {
    30
}

fn default_anon_burst() -> u32 {
    10
}

fn default_keyed_rpm() -> u32 {
    120
}

fn default_keyed_burst() -> u32 {
    20
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract_budgets() {
        let cfg = FacadeConfig::default();
        assert_eq!(cfg.max_body_bytes, 32 * 1024);
        assert_eq!(cfg.timeout_ms, 5_000);
        assert_eq!(cfg.max_in_flight, 16);
        assert_eq!((cfg.anon_rpm, cfg.anon_burst), (30, 10));
        assert_eq!((cfg.keyed_rpm, cfg.keyed_burst), (120, 20));
    }
}
