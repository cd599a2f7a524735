//! In-memory event store and range query façade.
//!
//! Holds master events, their exceptions and the expansion cache. Range
//! queries test non-recurring masters for overlap directly and route
//! recurring ones through the expansion engine. Every mutation ends by
//! emitting one [`ChangeSet`].
//!
//! The store has a single owner and no internal locking. Sharing it across
//! threads needs one lock around the whole store, since cache invalidation
//! and patching span several maps.

use std::collections::BTreeMap;

use chrono::{NaiveDateTime, TimeDelta};

use crate::cache::ExpansionCache;
use crate::change::{ChangeKind, ChangeObserver, ChangeSet};
use crate::config::EngineConfig;
use crate::date_math::{WallClockOffset, normalize_date, to_iso};
use crate::date_range::QueryWindow;
use crate::error::{OccurError, OccurResult};
use crate::evaluator::{RRuleEvaluator, RecurrenceEvaluator};
use crate::event::{Event, RecurrencePattern};
use crate::exception::{ExceptionStore, RecurrenceException};
use crate::recurrence::{ExpandOptions, expand_recurring_event, within_window};

pub struct EventStore {
    masters: BTreeMap<String, Event>,
    exceptions: ExceptionStore,
    cache: ExpansionCache,
    evaluator: Box<dyn RecurrenceEvaluator>,
    options: ExpandOptions,
    observers: Vec<Box<dyn ChangeObserver>>,
    last_change: Option<ChangeSet>,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl EventStore {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_evaluator(config, Box::new(RRuleEvaluator::new(config.occurrence_limit)))
    }

    pub fn with_evaluator(config: &EngineConfig, evaluator: Box<dyn RecurrenceEvaluator>) -> Self {
        EventStore {
            masters: BTreeMap::new(),
            exceptions: ExceptionStore::new(),
            cache: ExpansionCache::new(),
            evaluator,
            options: ExpandOptions::from(config),
            observers: Vec::new(),
            last_change: None,
        }
    }

    // OBSERVERS:

    pub fn subscribe(&mut self, observer: impl ChangeObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// The descriptor emitted by the most recent mutation.
    pub fn last_change(&self) -> Option<&ChangeSet> {
        self.last_change.as_ref()
    }

    fn emit(&mut self, change: ChangeSet) {
        tracing::debug!(%change, "Event store changed");
        for observer in &self.observers {
            observer.on_change(&change);
        }
        self.last_change = Some(change);
    }

    // MASTERS:

    pub fn get(&self, id: &str) -> Option<&Event> {
        self.masters.get(id)
    }

    /// Master events ordered by id.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.masters.values()
    }

    pub fn len(&self) -> usize {
        self.masters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masters.is_empty()
    }

    /// Insert masters. Every event is validated before any is stored.
    ///
    /// An existing id is replaced as by [`EventStore::update_event`]. The
    /// change is `Added` when every id is new, `Updated` when every id
    /// existed and `Bulk` for a mix.
    pub fn add_events<I>(&mut self, events: I) -> OccurResult<()>
    where
        I: IntoIterator<Item = Event>,
    {
        let events: Vec<Event> = events.into_iter().collect();
        for event in &events {
            event.validate()?;
        }
        if events.is_empty() {
            return Ok(());
        }

        let replaced = events
            .iter()
            .filter(|e| self.masters.contains_key(&e.id))
            .count();
        let kind = match replaced {
            0 => ChangeKind::Added,
            n if n == events.len() => ChangeKind::Updated,
            _ => ChangeKind::Bulk,
        };

        let mut change = ChangeSet::new(kind, events.iter().map(|e| e.id.clone()));
        change.affected_range = span_of(events.iter());

        for event in events {
            self.replace_master(event);
        }

        self.emit(change);
        Ok(())
    }

    pub fn add_event(&mut self, event: Event) -> OccurResult<()> {
        self.add_events([event])
    }

    /// Replace a master. Its exceptions stay attached and apply to the new
    /// pattern, unless the new master no longer recurs.
    pub fn update_event(&mut self, event: Event) -> OccurResult<()> {
        event.validate()?;
        let Some(previous) = self.masters.get(&event.id) else {
            return Err(OccurError::SeriesNotFound(event.id));
        };

        let mut change = ChangeSet::new(ChangeKind::Updated, [event.id.clone()]);
        change.affected_range = span_of([previous, &event].into_iter());

        self.replace_master(event);

        self.emit(change);
        Ok(())
    }

    fn replace_master(&mut self, event: Event) {
        self.cache.invalidate(&event.id);
        if !event.is_recurring() && self.exceptions.remove_series(&event.id).is_some() {
            tracing::debug!(series_id = %event.id, "Dropped exceptions of a master that no longer recurs");
        }
        self.masters.insert(event.id.clone(), event);
    }

    /// Remove a master together with its exceptions and cached expansion.
    pub fn remove_event(&mut self, id: &str) -> OccurResult<Event> {
        let removed = self
            .masters
            .remove(id)
            .ok_or_else(|| OccurError::SeriesNotFound(id.to_string()))?;
        self.exceptions.remove_series(id);
        self.cache.invalidate(id);

        let mut change = ChangeSet::new(ChangeKind::Removed, [id]);
        change.affected_range = span_of([&removed].into_iter());
        self.emit(change);

        Ok(removed)
    }

    pub fn clear(&mut self) {
        let ids: Vec<String> = self.masters.keys().cloned().collect();
        self.masters.clear();
        self.exceptions.clear();
        self.cache.clear();

        self.emit(ChangeSet::new(ChangeKind::Removed, ids));
    }

    fn recurring_master(&self, id: &str) -> OccurResult<(&Event, &RecurrencePattern)> {
        let master = self
            .masters
            .get(id)
            .ok_or_else(|| OccurError::SeriesNotFound(id.to_string()))?;
        match &master.recurrence {
            Some(pattern) => Ok((master, pattern)),
            None => Err(OccurError::NotRecurring(id.to_string())),
        }
    }

    // QUERIES:

    pub fn active_window(&self) -> Option<QueryWindow> {
        self.cache.active_window()
    }

    /// Every event overlapping `window`: non-recurring masters as stored and
    /// occurrences of recurring ones. Ordered by start, then id.
    ///
    /// A window different from the previous query's drops the whole
    /// expansion cache first.
    pub fn get_for_range(&mut self, window: &QueryWindow) -> Vec<Event> {
        self.cache.activate(*window);

        let EventStore {
            masters,
            exceptions,
            cache,
            evaluator,
            options,
            ..
        } = self;

        let mut results = Vec::new();
        for master in masters.values() {
            if master.is_recurring() {
                results.extend(expand_cached(
                    cache,
                    master,
                    exceptions,
                    &**evaluator,
                    options,
                    window,
                ));
            } else if window.overlaps(master.start, master.end) {
                results.push(master.clone());
            }
        }

        results.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        results
    }

    /// Occurrences of one recurring series overlapping `window`.
    pub fn expand(&mut self, series_id: &str, window: &QueryWindow) -> OccurResult<Vec<Event>> {
        self.recurring_master(series_id)?;
        self.cache.activate(*window);

        let master = &self.masters[series_id];
        Ok(expand_cached(
            &mut self.cache,
            master,
            &self.exceptions,
            &*self.evaluator,
            &self.options,
            window,
        ))
    }

    /// The occurrence of `series_id` originally due on the day of
    /// `original_date`, if it overlaps `window`.
    pub fn occurrence(
        &mut self,
        series_id: &str,
        original_date: NaiveDateTime,
        window: &QueryWindow,
    ) -> OccurResult<Option<Event>> {
        let occurrence_id = to_iso(normalize_date(original_date));
        Ok(self
            .expand(series_id, window)?
            .into_iter()
            .find(|o| o.occurrence_id.as_deref() == Some(occurrence_id.as_str())))
    }

    // EXCEPTIONS:

    /// Exceptions of a series ordered by original date.
    pub fn exceptions(&self, series_id: &str) -> impl Iterator<Item = &RecurrenceException> {
        self.exceptions
            .for_series(series_id)
            .into_iter()
            .flat_map(|series| series.values())
    }

    /// Add or overwrite the exception for one occurrence.
    ///
    /// A first exception for a day patches the cached expansion in place. An
    /// overwrite drops the series' cache entry instead, since the earlier
    /// patch may already have moved or removed the slot.
    pub fn add_exception(
        &mut self,
        series_id: &str,
        exception: RecurrenceException,
    ) -> OccurResult<()> {
        let offset = self.recurring_master(series_id)?.0.wall_clock_offset();
        let change = exception_change(ChangeKind::ExceptionAdded, series_id, &exception, &offset);
        let effective = exception.effective_span(&offset);

        let previous = self.exceptions.insert(series_id, exception.clone());
        if previous.is_some() {
            self.cache.invalidate(series_id);
        } else if !self.cache.patch(series_id, &exception, &offset) {
            // Nothing cached for the original date. If the new date lands in
            // the active window the cached list would miss it.
            let lands_in_window = matches!(
                (effective, self.cache.active_window()),
                (Some((start, end)), Some(window)) if window.overlaps(start, end)
            );
            if lands_in_window {
                self.cache.invalidate(series_id);
            }
        }

        self.emit(change);
        Ok(())
    }

    /// Add or overwrite many exceptions, then drop the series' cache entry
    /// once.
    pub fn add_exceptions<I>(&mut self, series_id: &str, exceptions: I) -> OccurResult<()>
    where
        I: IntoIterator<Item = RecurrenceException>,
    {
        let offset = self.recurring_master(series_id)?.0.wall_clock_offset();

        let mut change = ChangeSet::new(ChangeKind::Bulk, [series_id]);
        for exception in exceptions {
            let single = exception_change(ChangeKind::Bulk, series_id, &exception, &offset);
            if let Some((start, end)) = single.affected_range {
                change = change.cover(start, end);
            }
            self.exceptions.insert(series_id, exception);
        }
        self.cache.invalidate(series_id);

        self.emit(change);
        Ok(())
    }

    /// Remove the exception for the day of `original_date`. The series'
    /// cache entry is dropped rather than un-patched.
    pub fn remove_exception(
        &mut self,
        series_id: &str,
        original_date: NaiveDateTime,
    ) -> OccurResult<Option<RecurrenceException>> {
        let offset = self.recurring_master(series_id)?.0.wall_clock_offset();

        let Some(removed) = self.exceptions.remove(series_id, original_date) else {
            return Ok(None);
        };
        self.cache.invalidate(series_id);

        self.emit(exception_change(
            ChangeKind::ExceptionRemoved,
            series_id,
            &removed,
            &offset,
        ));
        Ok(Some(removed))
    }

    // SERIES LIFECYCLE:

    /// Split a series at `date` into two independent series and return the
    /// new series' id.
    ///
    /// The original ends the day before `date`. The new series starts on
    /// `date` at the original time of day with the original, untruncated
    /// pattern, and takes over every exception on or after `date`.
    pub fn split_series(&mut self, id: &str, date: NaiveDateTime) -> OccurResult<String> {
        let (master, pattern) = self.recurring_master(id)?;
        let (master, pattern) = (master.clone(), pattern.clone());
        self.ensure_after_first_day(&master, date)?;

        let new_id = format!("{}_split_{}", id, to_iso(date));
        if self.masters.contains_key(&new_id) {
            return Err(OccurError::InvalidOperation(format!(
                "Series '{id}' was already split at {date}"
            )));
        }

        let truncated_pattern = self.truncated_pattern(&pattern, master.start, date);

        let new_start = date.date().and_time(master.start.time());
        let mut new_master = master.clone();
        new_master.id = new_id.clone();
        new_master.start = new_start;
        new_master.end = master.wall_clock_offset().apply(new_start);

        let mut original = master;
        original.recurrence = Some(truncated_pattern);

        let moved = self.exceptions.split_off(id, date);
        tracing::debug!(
            series_id = id,
            new_series_id = %new_id,
            moved = moved.len(),
            "Splitting series"
        );
        self.exceptions.extend_series(&new_id, moved);

        self.cache.invalidate(id);
        self.cache.invalidate(&new_id);
        self.masters.insert(id.to_string(), original);
        self.masters.insert(new_id.clone(), new_master);

        self.emit(ChangeSet::new(ChangeKind::SeriesSplit, [id.to_string(), new_id.clone()]));
        Ok(new_id)
    }

    /// End a series the day before `date`, discarding exceptions on or after
    /// it.
    pub fn truncate_series(&mut self, id: &str, date: NaiveDateTime) -> OccurResult<()> {
        let (master, pattern) = self.recurring_master(id)?;
        let mut truncated = master.clone();
        self.ensure_after_first_day(&truncated, date)?;
        truncated.recurrence = Some(self.truncated_pattern(pattern, truncated.start, date));

        let dropped = self.exceptions.split_off(id, date);
        tracing::debug!(series_id = id, dropped = dropped.len(), "Truncating series");

        self.cache.invalidate(id);
        self.masters.insert(id.to_string(), truncated);

        self.emit(ChangeSet::new(ChangeKind::Updated, [id]));
        Ok(())
    }

    fn ensure_after_first_day(&self, master: &Event, date: NaiveDateTime) -> OccurResult<()> {
        if normalize_date(date) <= normalize_date(master.start) {
            return Err(OccurError::InvalidOperation(format!(
                "Cannot cut series '{}' at {}, which is not after its first day",
                master.id, date
            )));
        }
        Ok(())
    }

    /// `pattern` ending the day before `date`.
    ///
    /// A COUNT that runs out before `date` is turned into an UNTIL at the
    /// last counted occurrence so dropping COUNT cannot add occurrences.
    fn truncated_pattern(
        &self,
        pattern: &RecurrencePattern,
        origin: NaiveDateTime,
        date: NaiveDateTime,
    ) -> RecurrencePattern {
        let mut truncated = pattern.truncated_before(date);

        if let (Some(count), Some(cutoff)) = (pattern.count, truncated.until) {
            if let Some(last) = self.last_counted_before(pattern, origin, count, cutoff) {
                truncated.until = Some(last);
            }
        }

        truncated
    }

    /// The `count`-th occurrence of `pattern` if it falls on or before
    /// `cutoff`. Pages through the evaluator so its per-call limit cannot hide
    /// the end of a long count.
    fn last_counted_before(
        &self,
        pattern: &RecurrencePattern,
        origin: NaiveDateTime,
        count: u32,
        cutoff: NaiveDateTime,
    ) -> Option<NaiveDateTime> {
        let mut after = origin - TimeDelta::seconds(1);
        let mut seen: u64 = 0;

        loop {
            let page = self.evaluator.occurrences(
                pattern,
                origin,
                after,
                cutoff,
                self.options.fallback_week_start,
            );
            let last = *page.last()?;
            seen += page.len() as u64;
            if seen >= u64::from(count) {
                return Some(last);
            }
            after = last;
        }
    }
}

/// Cached occurrences for `window` when present, otherwise a fresh expansion
/// that is cached before being narrowed to the window.
fn expand_cached(
    cache: &mut ExpansionCache,
    master: &Event,
    exceptions: &ExceptionStore,
    evaluator: &dyn RecurrenceEvaluator,
    options: &ExpandOptions,
    window: &QueryWindow,
) -> Vec<Event> {
    if let Some(cached) = cache.get(&master.id, window) {
        tracing::trace!(series_id = %master.id, "Expansion cache hit");
        return within_window(cached, window);
    }

    let all = expand_recurring_event(
        master,
        window,
        exceptions.for_series(&master.id),
        evaluator,
        options,
    );
    let visible = within_window(&all, window);
    cache.insert(&master.id, *window, all);
    visible
}

/// Range covered by non-recurring events; `None` as soon as one recurs.
fn span_of<'a>(
    mut events: impl Iterator<Item = &'a Event>,
) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let first = events.next()?;
    if first.is_recurring() {
        return None;
    }

    events.try_fold((first.start, first.end), |(lo, hi), event| {
        (!event.is_recurring()).then(|| (lo.min(event.start), hi.max(event.end)))
    })
}

fn exception_change(
    kind: ChangeKind,
    series_id: &str,
    exception: &RecurrenceException,
    offset: &WallClockOffset,
) -> ChangeSet {
    let key = exception.key();
    let change = ChangeSet::new(kind, [series_id])
        .with_range(key, key + TimeDelta::days(1) - TimeDelta::milliseconds(1));

    match exception.effective_span(offset) {
        Some((start, end)) => change.cover(start, end),
        None => change,
    }
}
