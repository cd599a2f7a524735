//! Engine configuration.

use std::path::{Path, PathBuf};

use chrono::Weekday;
use config::{Config, File};
use serde::{Deserialize, Serialize};

use crate::error::{OccurError, OccurResult};

/// Upper bound on raw occurrences requested from the evaluator per series
/// and query. Only guards against runaway rules; any real window fits.
pub const DEFAULT_OCCURRENCE_LIMIT: u16 = u16::MAX;

fn default_week_start() -> Weekday {
    Weekday::Mon
}

fn default_occurrence_limit() -> u16 {
    DEFAULT_OCCURRENCE_LIMIT
}

fn default_fast_forward() -> bool {
    true
}

/// Configuration at ~/.config/occur/config.toml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Week start for patterns that do not set WKST themselves.
    #[serde(default = "default_week_start")]
    pub fallback_week_start: Weekday,

    #[serde(default = "default_occurrence_limit")]
    pub occurrence_limit: u16,

    /// Move daily/weekly origins close to the query window before evaluating.
    #[serde(default = "default_fast_forward")]
    pub fast_forward: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            fallback_week_start: default_week_start(),
            occurrence_limit: default_occurrence_limit(),
            fast_forward: default_fast_forward(),
        }
    }
}

impl EngineConfig {
    pub fn config_path() -> OccurResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| OccurError::Config("Could not determine config directory".into()))?
            .join("occur");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from the default path. A missing file yields the defaults.
    pub fn load() -> OccurResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> OccurResult<Self> {
        let config: EngineConfig = Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .build()
            .map_err(|e| OccurError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| OccurError::Config(e.to_string()))?;

        tracing::debug!(path = %path.display(), ?config, "Loaded engine config");
        Ok(config)
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> OccurResult<()> {
        let contents = format!(
            "\
# occur configuration

# Week start for rules without WKST (Mon, Tue, ... Sun):
# fallback_week_start = \"Mon\"

# Maximum raw occurrences evaluated per series and query:
# occurrence_limit = {DEFAULT_OCCURRENCE_LIMIT}

# Skip ahead in long daily/weekly series instead of iterating from their start:
# fast_forward = true
"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                OccurError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| OccurError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    pub fn to_toml(&self) -> OccurResult<String> {
        toml::to_string_pretty(self).map_err(|e| OccurError::Serialization(e.to_string()))
    }
}
