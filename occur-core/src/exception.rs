//! Per-occurrence overrides and their per-series store.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::date_math::{WallClockOffset, normalize_date};
use crate::event::Event;

/// An override for one occurrence of a series, keyed by the occurrence's
/// original date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecurrenceException {
    /// The occurrence does not happen.
    Deleted { original_date: NaiveDateTime },
    /// The occurrence moves to `new_start`; its end keeps the master's
    /// wall-clock offset.
    Rescheduled {
        original_date: NaiveDateTime,
        new_start: NaiveDateTime,
    },
    /// The occurrence is replaced by an arbitrary event.
    Modified {
        original_date: NaiveDateTime,
        replacement: Event,
    },
}

impl RecurrenceException {
    pub fn original_date(&self) -> NaiveDateTime {
        match self {
            RecurrenceException::Deleted { original_date }
            | RecurrenceException::Rescheduled { original_date, .. }
            | RecurrenceException::Modified { original_date, .. } => *original_date,
        }
    }

    /// Store key: the original date at midnight.
    pub fn key(&self) -> NaiveDateTime {
        normalize_date(self.original_date())
    }

    /// Start and end the occurrence takes after the override, `None` for
    /// deletions.
    pub fn effective_span(&self, offset: &WallClockOffset) -> Option<(NaiveDateTime, NaiveDateTime)> {
        match self {
            RecurrenceException::Deleted { .. } => None,
            RecurrenceException::Rescheduled { new_start, .. } => {
                Some((*new_start, offset.apply(*new_start)))
            }
            RecurrenceException::Modified { replacement, .. } => {
                Some((replacement.start, replacement.end))
            }
        }
    }
}

/// Exceptions of one series ordered by key.
pub type SeriesExceptions = BTreeMap<NaiveDateTime, RecurrenceException>;

/// Exceptions for every series, at most one per (series, day).
#[derive(Debug, Clone, Default)]
pub struct ExceptionStore {
    by_series: HashMap<String, SeriesExceptions>,
}

impl ExceptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. Returns the exception previously stored for the
    /// same day, if any.
    pub fn insert(
        &mut self,
        series_id: &str,
        exception: RecurrenceException,
    ) -> Option<RecurrenceException> {
        self.by_series
            .entry(series_id.to_string())
            .or_default()
            .insert(exception.key(), exception)
    }

    pub fn remove(
        &mut self,
        series_id: &str,
        original_date: NaiveDateTime,
    ) -> Option<RecurrenceException> {
        let series = self.by_series.get_mut(series_id)?;
        let removed = series.remove(&normalize_date(original_date));
        if series.is_empty() {
            self.by_series.remove(series_id);
        }
        removed
    }

    pub fn get(&self, series_id: &str, original_date: NaiveDateTime) -> Option<&RecurrenceException> {
        self.by_series
            .get(series_id)?
            .get(&normalize_date(original_date))
    }

    pub fn for_series(&self, series_id: &str) -> Option<&SeriesExceptions> {
        self.by_series.get(series_id)
    }

    pub fn remove_series(&mut self, series_id: &str) -> Option<SeriesExceptions> {
        self.by_series.remove(series_id)
    }

    /// Detach every exception of `series_id` keyed on or after the day of
    /// `from`.
    pub fn split_off(&mut self, series_id: &str, from: NaiveDateTime) -> SeriesExceptions {
        let Some(series) = self.by_series.get_mut(series_id) else {
            return SeriesExceptions::new();
        };

        let moved = series.split_off(&normalize_date(from));
        if series.is_empty() {
            self.by_series.remove(series_id);
        }
        moved
    }

    /// Attach exceptions to `series_id`, overwriting same-day entries.
    pub fn extend_series(&mut self, series_id: &str, exceptions: SeriesExceptions) {
        if exceptions.is_empty() {
            return;
        }
        self.by_series
            .entry(series_id.to_string())
            .or_default()
            .extend(exceptions);
    }

    pub fn clear(&mut self) {
        self.by_series.clear();
    }
}
