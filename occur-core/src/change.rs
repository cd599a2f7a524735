//! Change descriptors emitted after every mutation of an event store.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::mpsc::Sender;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Updated,
    ExceptionAdded,
    ExceptionRemoved,
    SeriesSplit,
    Bulk,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "added"),
            ChangeKind::Removed => write!(f, "removed"),
            ChangeKind::Updated => write!(f, "updated"),
            ChangeKind::ExceptionAdded => write!(f, "exception added"),
            ChangeKind::ExceptionRemoved => write!(f, "exception removed"),
            ChangeKind::SeriesSplit => write!(f, "series split"),
            ChangeKind::Bulk => write!(f, "bulk"),
        }
    }
}

/// What changed: the kind of mutation, the series ids involved and, when
/// known, the span of time whose rendering may be stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub kind: ChangeKind,
    pub affected_ids: BTreeSet<String>,
    pub affected_range: Option<(NaiveDateTime, NaiveDateTime)>,
}

impl ChangeSet {
    pub fn new<I, S>(kind: ChangeKind, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ChangeSet {
            kind,
            affected_ids: ids.into_iter().map(Into::into).collect(),
            affected_range: None,
        }
    }

    pub fn with_range(mut self, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        self.affected_range = Some((start.min(end), start.max(end)));
        self
    }

    /// Widen the range to cover `[start, end]` as well.
    pub fn cover(mut self, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        self.affected_range = Some(match self.affected_range {
            Some((lo, hi)) => (lo.min(start), hi.max(end)),
            None => (start, end),
        });
        self
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.affected_ids.iter().map(String::as_str).collect();
        write!(f, "{}: {}", self.kind, ids.join(", "))
    }
}

/// Receives a [`ChangeSet`] after every mutation.
pub trait ChangeObserver {
    fn on_change(&self, change: &ChangeSet);
}

impl<F> ChangeObserver for F
where
    F: Fn(&ChangeSet),
{
    fn on_change(&self, change: &ChangeSet) {
        self(change)
    }
}

impl ChangeObserver for Sender<ChangeSet> {
    fn on_change(&self, change: &ChangeSet) {
        if self.send(change.clone()).is_err() {
            tracing::trace!("Change receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_cover_widens_range() {
        let change = ChangeSet::new(ChangeKind::Bulk, ["standup"])
            .cover(dt(11), dt(12))
            .cover(dt(5), dt(6))
            .cover(dt(20), dt(21));

        assert_eq!(change.affected_range, Some((dt(5), dt(21))));
    }

    #[test]
    fn test_with_range_orders_bounds() {
        let change = ChangeSet::new(ChangeKind::Updated, ["a"]).with_range(dt(12), dt(10));
        assert_eq!(change.affected_range, Some((dt(10), dt(12))));
    }

    #[test]
    fn test_sender_observer_forwards_changes() {
        let (tx, rx) = std::sync::mpsc::channel();
        tx.on_change(&ChangeSet::new(ChangeKind::Removed, ["a", "b"]));

        let received = rx.recv().unwrap();
        assert_eq!(received.kind, ChangeKind::Removed);
        assert_eq!(received.to_string(), "removed: a, b");
    }
}
