//! Engine configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{CounterError, CounterResult};

const MAX_WINDOW_MS: u64 = 3_600_000;
const MAX_DURATION_MS: u64 = 86_400_000;

/// Tunables shared by every session of a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Width of one timeline bucket.
    pub window_ms: u64,
    /// Tracks with no detection for this long are considered gone.
    pub inactivity_timeout_ms: u64,
    /// How far behind the watermark an event may arrive and still count.
    pub max_clock_skew_ms: u64,
    /// How far ahead of the watermark an event may jump before it is treated as corrupt.
    pub max_forward_jump_ms: u64,
    /// Sealed buckets kept before the oldest are folded into a summary.
    pub max_history_buckets: usize,
    /// Directory for append-only bucket logs. `None` keeps history in memory only.
    pub log_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_ms: 1_000,
            inactivity_timeout_ms: 2_000,
            max_clock_skew_ms: 500,
            max_forward_jump_ms: 3_600_000,
            max_history_buckets: 10_800,
            log_dir: None,
        }
    }
}

impl EngineConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> CounterResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&text).map_err(|e| {
            CounterError::InvalidConfig(format!("{}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CounterResult<()> {
        if self.window_ms == 0 || self.window_ms > MAX_WINDOW_MS {
            return Err(CounterError::InvalidConfig(format!(
                "window_ms must be in 1..={MAX_WINDOW_MS}, got {}",
                self.window_ms
            )));
        }
        if self.max_history_buckets == 0 {
            return Err(CounterError::InvalidConfig(
                "max_history_buckets must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("inactivity_timeout_ms", self.inactivity_timeout_ms),
            ("max_clock_skew_ms", self.max_clock_skew_ms),
            ("max_forward_jump_ms", self.max_forward_jump_ms),
        ] {
            if value > MAX_DURATION_MS {
                return Err(CounterError::InvalidConfig(format!(
                    "{name} must be at most {MAX_DURATION_MS}, got {value}"
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn window(&self) -> i64 {
        self.window_ms as i64
    }

    pub(crate) fn inactivity_timeout(&self) -> i64 {
        self.inactivity_timeout_ms as i64
    }

    pub(crate) fn max_clock_skew(&self) -> i64 {
        self.max_clock_skew_ms as i64
    }

    pub(crate) fn max_forward_jump(&self) -> i64 {
        self.max_forward_jump_ms as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.window_ms, 1_000);
        assert_eq!(config.inactivity_timeout_ms, 2_000);
        assert_eq!(config.max_clock_skew_ms, 500);
        assert_eq!(config.max_history_buckets, 10_800);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "window_ms": 250 }"#).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.window_ms, 250);
        assert_eq!(config.max_clock_skew_ms, 500);
    }

    #[test]
    fn test_rejects_zero_window() {
        let config = EngineConfig {
            window_ms: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(CounterError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "window_ms = 5").unwrap();
        assert!(EngineConfig::from_file(&path).is_err());
    }
}
