//! Single-window expansion cache.
//!
//! Entries are keyed by series id and are only valid while the active window
//! equals the window they were computed for. Activating a different window
//! drops every entry.

use std::collections::HashMap;

use crate::date_math::{WallClockOffset, to_iso};
use crate::date_range::QueryWindow;
use crate::event::Event;
use crate::exception::RecurrenceException;

#[derive(Debug, Clone, Default)]
pub struct ExpansionCache {
    active_window: Option<QueryWindow>,
    entries: HashMap<String, Vec<Event>>,
}

impl ExpansionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_window(&self) -> Option<QueryWindow> {
        self.active_window
    }

    /// Make `window` the active window. Returns true when it differed from
    /// the previous one and all entries were dropped.
    pub fn activate(&mut self, window: QueryWindow) -> bool {
        if self.active_window == Some(window) {
            return false;
        }

        if !self.entries.is_empty() {
            tracing::debug!(
                dropped = self.entries.len(),
                window = %window,
                "Active window changed, dropping expansion cache"
            );
        }
        self.entries.clear();
        self.active_window = Some(window);
        true
    }

    /// Cached occurrences of `series_id`, only if computed for `window`.
    pub fn get(&self, series_id: &str, window: &QueryWindow) -> Option<&[Event]> {
        if self.active_window != Some(*window) {
            return None;
        }
        self.entries.get(series_id).map(Vec::as_slice)
    }

    pub fn contains(&self, series_id: &str) -> bool {
        self.entries.contains_key(series_id)
    }

    pub fn insert(&mut self, series_id: &str, window: QueryWindow, occurrences: Vec<Event>) {
        self.activate(window);
        self.entries.insert(series_id.to_string(), occurrences);
    }

    pub fn invalidate(&mut self, series_id: &str) -> bool {
        let dropped = self.entries.remove(series_id).is_some();
        if dropped {
            tracing::debug!(series_id, "Invalidated cached expansion");
        }
        dropped
    }

    /// Drop all entries and forget the active window.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.active_window = None;
    }

    /// Apply a newly added exception to the cached occurrences of its series
    /// without re-expanding. Returns false when no cached occurrence carries
    /// the exception's original date, in which case nothing changes.
    pub fn patch(
        &mut self,
        series_id: &str,
        exception: &RecurrenceException,
        offset: &WallClockOffset,
    ) -> bool {
        let Some(occurrences) = self.entries.get_mut(series_id) else {
            return false;
        };

        let occurrence_id = to_iso(exception.key());
        let Some(index) = occurrences
            .iter()
            .position(|o| o.occurrence_id.as_deref() == Some(occurrence_id.as_str()))
        else {
            return false;
        };

        match exception {
            RecurrenceException::Deleted { .. } => {
                occurrences.remove(index);
            }
            RecurrenceException::Rescheduled { new_start, .. } => {
                let slot = &mut occurrences[index];
                slot.start = *new_start;
                slot.end = offset.apply(*new_start);
            }
            RecurrenceException::Modified { replacement, .. } => {
                occurrences[index] = replacement
                    .clone()
                    .into_occurrence(series_id, exception.key());
            }
        }

        tracing::debug!(series_id, occurrence_id, "Patched cached expansion");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn dt(y: i32, m: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    fn window(from: u32, to: u32) -> QueryWindow {
        QueryWindow::days(
            NaiveDate::from_ymd_opt(2024, 6, from).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, to).unwrap(),
        )
        .unwrap()
    }

    fn occurrences(days: &[u32]) -> Vec<Event> {
        days.iter()
            .map(|d| {
                Event::new("standup", "Standup", dt(2024, 6, *d, 9, 0), dt(2024, 6, *d, 9, 15))
                    .into_occurrence("standup", dt(2024, 6, *d, 0, 0))
            })
            .collect()
    }

    fn offset() -> WallClockOffset {
        WallClockOffset::between(dt(2024, 6, 1, 9, 0), dt(2024, 6, 1, 9, 15))
    }

    #[test]
    fn test_entry_only_valid_for_active_window() {
        let mut cache = ExpansionCache::new();
        cache.insert("standup", window(10, 12), occurrences(&[10, 11, 12]));

        assert_eq!(cache.get("standup", &window(10, 12)).unwrap().len(), 3);
        assert!(cache.get("standup", &window(14, 16)).is_none());
    }

    #[test]
    fn test_window_change_drops_every_series() {
        let mut cache = ExpansionCache::new();
        cache.insert("a", window(10, 12), occurrences(&[10]));
        cache.insert("b", window(10, 12), occurrences(&[11]));

        assert!(!cache.activate(window(10, 12)));
        assert!(cache.activate(window(14, 16)));
        assert!(!cache.contains("a"));
        assert!(!cache.contains("b"));
    }

    #[test]
    fn test_patch_deleted_removes_slot() {
        let mut cache = ExpansionCache::new();
        cache.insert("standup", window(10, 12), occurrences(&[10, 11, 12]));

        let patched = cache.patch(
            "standup",
            &RecurrenceException::Deleted {
                original_date: dt(2024, 6, 11, 0, 0),
            },
            &offset(),
        );

        assert!(patched);
        let ids: Vec<_> = cache
            .get("standup", &window(10, 12))
            .unwrap()
            .iter()
            .map(|o| o.id.clone())
            .collect();
        assert_eq!(
            ids,
            vec!["standup_2024-06-10T00:00:00.000", "standup_2024-06-12T00:00:00.000"]
        );
    }

    #[test]
    fn test_patch_rescheduled_moves_slot_in_place() {
        let mut cache = ExpansionCache::new();
        cache.insert("standup", window(10, 12), occurrences(&[10, 11, 12]));

        cache.patch(
            "standup",
            &RecurrenceException::Rescheduled {
                original_date: dt(2024, 6, 11, 0, 0),
                new_start: dt(2024, 6, 11, 13, 30),
            },
            &offset(),
        );

        let moved = &cache.get("standup", &window(10, 12)).unwrap()[1];
        assert_eq!(moved.start, dt(2024, 6, 11, 13, 30));
        assert_eq!(moved.end, dt(2024, 6, 11, 13, 45));
        assert_eq!(moved.occurrence_id.as_deref(), Some("2024-06-11T00:00:00.000"));
    }

    #[test]
    fn test_patch_modified_replaces_slot_and_keeps_ids() {
        let mut cache = ExpansionCache::new();
        cache.insert("standup", window(10, 12), occurrences(&[10, 11, 12]));

        let replacement = Event::new("other", "Retro", dt(2024, 6, 11, 15, 0), dt(2024, 6, 11, 16, 0));
        cache.patch(
            "standup",
            &RecurrenceException::Modified {
                original_date: dt(2024, 6, 11, 0, 0),
                replacement,
            },
            &offset(),
        );

        let slot = &cache.get("standup", &window(10, 12)).unwrap()[1];
        assert_eq!(slot.title, "Retro");
        assert_eq!(slot.id, "standup_2024-06-11T00:00:00.000");
    }

    #[test]
    fn test_patch_for_uncached_date_is_noop() {
        let mut cache = ExpansionCache::new();
        cache.insert("standup", window(10, 12), occurrences(&[10, 11, 12]));

        let patched = cache.patch(
            "standup",
            &RecurrenceException::Deleted {
                original_date: dt(2024, 6, 20, 0, 0),
            },
            &offset(),
        );

        assert!(!patched);
        assert_eq!(cache.get("standup", &window(10, 12)).unwrap().len(), 3);
    }
}
