//! Expansion of recurring masters into occurrences within a query window.
//!
//! The RRULE itself is enumerated by a [`RecurrenceEvaluator`]. This module
//! pads the window for long masters, fast-forwards long daily/weekly series
//! and applies the series' exceptions, including ones whose original date
//! the evaluator never returned.

use std::collections::BTreeSet;

use chrono::{NaiveDateTime, Weekday};

use crate::config::EngineConfig;
use crate::date_math::{WallClockOffset, apply_offset, day_span, normalize_date};
use crate::date_range::QueryWindow;
use crate::evaluator::RecurrenceEvaluator;
use crate::event::{Event, Frequency, RecurrencePattern};
use crate::exception::{RecurrenceException, SeriesExceptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandOptions {
    pub fallback_week_start: Weekday,
    pub fast_forward: bool,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        ExpandOptions::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ExpandOptions {
    fn from(config: &EngineConfig) -> Self {
        ExpandOptions {
            fallback_week_start: config.fallback_week_start,
            fast_forward: config.fast_forward,
        }
    }
}

/// Move a daily or weekly origin forward by whole periods so it lands at
/// least one period before `padded_after`.
///
/// Patterns with a COUNT are never moved since counting starts at the true
/// origin. Monthly and yearly patterns are left alone: they iterate cheaply
/// and their BY rules are anchored to the real origin.
pub fn fast_forward_origin(
    pattern: &RecurrencePattern,
    origin: NaiveDateTime,
    padded_after: NaiveDateTime,
) -> NaiveDateTime {
    if pattern.count.is_some() || pattern.interval == 0 {
        return origin;
    }

    let period_days = match pattern.frequency {
        Frequency::Daily => i64::from(pattern.interval),
        Frequency::Weekly => i64::from(pattern.interval) * 7,
        Frequency::Monthly | Frequency::Yearly => return origin,
    };

    let periods = day_span(origin, padded_after) / period_days - 1;
    if periods <= 0 {
        return origin;
    }

    let advanced = apply_offset(origin, periods * period_days, 0, 0, 0, 0);
    if pattern.until.is_some_and(|until| advanced > until) {
        return origin;
    }
    advanced
}

/// Every occurrence of `master` that the padded window yields, with
/// `exceptions` applied, ordered by start.
///
/// The list can hold occurrences outside `window` (padding slack and
/// rescheduled dates); callers narrow it with [`within_window`].
pub fn expand_recurring_event(
    master: &Event,
    window: &QueryWindow,
    exceptions: Option<&SeriesExceptions>,
    evaluator: &dyn RecurrenceEvaluator,
    options: &ExpandOptions,
) -> Vec<Event> {
    let Some(pattern) = &master.recurrence else {
        return Vec::new();
    };

    let offset = master.wall_clock_offset();
    let padded_after = window.start - master.duration();
    let origin = if options.fast_forward {
        fast_forward_origin(pattern, master.start, padded_after)
    } else {
        master.start
    };

    // A series that ended before the padded window has no raw dates in it.
    let ended = pattern.until.is_some_and(|until| until <= padded_after);
    let raw = if ended {
        Vec::new()
    } else {
        evaluator.occurrences(
            pattern,
            origin,
            padded_after,
            window.end,
            options.fallback_week_start,
        )
    };
    tracing::trace!(
        series_id = %master.id,
        %origin,
        raw = raw.len(),
        "Evaluated recurrence"
    );

    let mut consumed = BTreeSet::new();
    let mut occurrences = Vec::with_capacity(raw.len());

    for start in raw {
        let key = normalize_date(start);
        consumed.insert(key);

        match exceptions.and_then(|e| e.get(&key)) {
            None => occurrences.push(at(master, start, &offset).into_occurrence(&master.id, key)),
            Some(exception) => occurrences.extend(apply_exception(master, exception, &offset)),
        }
    }

    // Exceptions whose original date the evaluator did not return can still
    // land in the window through their new dates.
    if let Some(exceptions) = exceptions {
        let orphans = exceptions
            .iter()
            .filter(|(key, _)| !consumed.contains(*key))
            .filter_map(|(_, exception)| apply_exception(master, exception, &offset))
            .filter(|occurrence| window.overlaps(occurrence.start, occurrence.end));
        occurrences.extend(orphans);
    }

    sort_occurrences(&mut occurrences);
    occurrences
}

/// Occurrences overlapping `window`, in order.
pub fn within_window(occurrences: &[Event], window: &QueryWindow) -> Vec<Event> {
    let mut matching: Vec<Event> = occurrences
        .iter()
        .filter(|o| window.overlaps(o.start, o.end))
        .cloned()
        .collect();
    sort_occurrences(&mut matching);
    matching
}

fn sort_occurrences(occurrences: &mut [Event]) {
    occurrences.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| a.occurrence_id.cmp(&b.occurrence_id))
    });
}

/// The master moved to `start`, keeping its wall-clock length.
fn at(master: &Event, start: NaiveDateTime, offset: &WallClockOffset) -> Event {
    let mut occurrence = master.clone();
    occurrence.start = start;
    occurrence.end = offset.apply(start);
    occurrence
}

fn apply_exception(
    master: &Event,
    exception: &RecurrenceException,
    offset: &WallClockOffset,
) -> Option<Event> {
    let event = match exception {
        RecurrenceException::Deleted { .. } => return None,
        RecurrenceException::Rescheduled { new_start, .. } => at(master, *new_start, offset),
        RecurrenceException::Modified { replacement, .. } => replacement.clone(),
    };
    Some(event.into_occurrence(&master.id, exception.key()))
}
