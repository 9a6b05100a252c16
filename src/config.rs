//! Configuration for the memory monitor

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How the monitor should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Poll on a cadence, clean at or above threshold, repeat until interrupted
    #[default]
    Continuous,
    /// Sample, clean exactly once regardless of threshold, then exit
    SingleShot,
}

/// Main monitor configuration
///
/// Constructed once at startup from defaults, an optional TOML file, and
/// CLI overrides; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// RAM percent threshold to trigger cleaning (0-100)
    pub threshold: u8,

    /// Seconds between checks while below threshold
    pub check_interval_secs: u64,

    /// Seconds to wait after a clean attempt before resuming checks
    pub cooldown_secs: u64,

    /// Milliseconds to let the system settle after a clean attempt
    /// before re-measuring memory
    pub settle_ms: u64,

    /// Run mode
    #[serde(default)]
    pub mode: RunMode,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            threshold: 60,
            check_interval_secs: 10,
            cooldown_secs: 60,
            settle_ms: 1000,
            mode: RunMode::Continuous,
        }
    }
}

/// Configuration validation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Threshold above 100 percent
    ThresholdOutOfRange(u8),
    /// Check interval must be positive
    ZeroCheckInterval,
    /// Failed to read or parse a config file
    LoadError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ThresholdOutOfRange(t) => {
                write!(f, "threshold must be 0-100, got {}", t)
            }
            ConfigError::ZeroCheckInterval => write!(f, "check interval must be greater than 0"),
            ConfigError::LoadError(msg) => write!(f, "failed to load config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl MonitorConfig {
    /// Load config from a TOML file
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadError(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| ConfigError::LoadError(format!("{}: {}", path.display(), e)))
    }

    /// Save config to a TOML file
    pub fn save(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::LoadError(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| ConfigError::LoadError(format!("{}: {}", path.display(), e)))
    }

    /// Check invariants that the loop relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threshold > 100 {
            return Err(ConfigError::ThresholdOutOfRange(self.threshold));
        }
        if self.check_interval_secs == 0 {
            return Err(ConfigError::ZeroCheckInterval);
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}
