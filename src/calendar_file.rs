//! Calendar files: master events plus their exceptions, as TOML or JSON.
//!
//! ```toml
//! [[events]]
//! id = "standup"
//! title = "Standup"
//! start = "2024-06-01T09:00:00"
//! end = "2024-06-01T09:15:00"
//! recurrence = "FREQ=DAILY"
//!
//! [[exceptions]]
//! series = "standup"
//! [exceptions.exception]
//! kind = "deleted"
//! original_date = "2024-06-11T00:00:00"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use occur_core::{EngineConfig, Event, EventStore, RecurrenceException};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CalendarFile {
    #[serde(default)]
    pub events: Vec<Event>,

    #[serde(default)]
    pub exceptions: Vec<ExceptionEntry>,
}

/// An exception together with the series it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionEntry {
    pub series: String,
    pub exception: RecurrenceException,
}

impl CalendarFile {
    /// Load a `.json` file as JSON and anything else as TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read calendar file {}", path.display()))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let file = if is_json {
            Self::from_json(&contents)
        } else {
            Self::from_toml(&contents)
        }
        .with_context(|| format!("Could not parse calendar file {}", path.display()))?;

        tracing::debug!(
            path = %path.display(),
            events = file.events.len(),
            exceptions = file.exceptions.len(),
            "Loaded calendar file"
        );
        Ok(file)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Build a store holding every event, then every exception grouped by
    /// series.
    pub fn into_store(self, config: &EngineConfig) -> Result<EventStore> {
        let mut store = EventStore::new(config);
        store.add_events(self.events)?;

        let mut by_series: BTreeMap<String, Vec<RecurrenceException>> = BTreeMap::new();
        for entry in self.exceptions {
            by_series.entry(entry.series).or_default().push(entry.exception);
        }

        for (series, exceptions) in by_series {
            store
                .add_exceptions(&series, exceptions)
                .with_context(|| format!("Could not apply exceptions to '{series}'"))?;
        }

        Ok(store)
    }
}
