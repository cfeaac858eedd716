use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the cached HTTP client.
///
/// Explicitly constructed at the composition root and threaded down; the
/// only environment lookup is `ALLOW_RECORD`, which gates live recording.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Cassette directory, conventionally `.cache/api/` under the workspace.
    pub cache_dir: PathBuf,
    /// When false, a cache miss may go live (subject to `allow_record`).
    pub offline: bool,
    /// One live call per missing key is permitted when set.
    pub allow_record: bool,
    /// Retries after the first attempt, for transient failures only.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub timeout: Duration,
}

impl FetchConfig {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            offline: true,
            allow_record: false,
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
        }
    }

    /// Honor `ALLOW_RECORD` from the environment; everything else keeps the
    /// offline defaults.
    pub fn from_env(cache_dir: impl Into<PathBuf>) -> Self {
        let allow_record = std::env::var_os("ALLOW_RECORD").is_some_and(|v| !v.is_empty());
        Self {
            allow_record,
            offline: !allow_record,
            ..Self::new(cache_dir)
        }
    }

    pub fn with_recording(mut self, allow: bool) -> Self {
        self.allow_record = allow;
        self.offline = !allow;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_offline() {
        let cfg = FetchConfig::new("/tmp/cache");
        assert!(cfg.offline);
        assert!(!cfg.allow_record);
        assert_eq!(cfg.max_retries, 3);
    }

    #[test]
    fn with_recording_flips_offline() {
        let cfg = FetchConfig::new("/tmp/cache").with_recording(true);
        assert!(!cfg.offline);
        assert!(cfg.allow_record);
    }
}
