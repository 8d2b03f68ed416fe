//! TOML configuration.
//!
//! ```toml
//! [recurrence]
//! max_repeat_count = 365
//! week_start = "mon"
//!
//! [sharing]
//! emit_tracked_events = true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{DayOfWeek, DEFAULT_MAX_REPEAT_COUNT};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceConfig {
    #[serde(default = "default_max_repeat_count")]
    pub max_repeat_count: u32,
    /// First day of a week, for interval counting and weekly buckets.
    #[serde(default = "default_week_start")]
    pub week_start: DayOfWeek,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharingConfig {
    #[serde(default = "default_true")]
    pub emit_tracked_events: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub recurrence: RecurrenceConfig,
    #[serde(default)]
    pub sharing: SharingConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: max_repeat_count must be at least 1")]
    ZeroRepeatCap,
}

fn default_max_repeat_count() -> u32 {
    DEFAULT_MAX_REPEAT_COUNT
}
fn default_week_start() -> DayOfWeek {
    DayOfWeek::Mon
}
fn default_true() -> bool {
    true
}

impl Default for RecurrenceConfig {
    fn default() -> Self {
        Self {
            max_repeat_count: default_max_repeat_count(),
            week_start: default_week_start(),
        }
    }
}

impl Default for SharingConfig {
    fn default() -> Self {
        Self {
            emit_tracked_events: true,
        }
    }
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(raw)?;
        if cfg.recurrence.max_repeat_count == 0 {
            return Err(ConfigError::ZeroRepeatCap);
        }
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                tracing::debug!(path = %path.display(), "config not found, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }
}
