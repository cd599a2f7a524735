//! Query windows for range lookups.

use std::fmt;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::error::{OccurError, OccurResult};

/// Days on either side of today used when a bound is not given.
pub const DEFAULT_WINDOW_DAYS: i64 = 7;

/// An inclusive `[start, end]` range of wall-clock timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl QueryWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> OccurResult<Self> {
        if end < start {
            return Err(OccurError::InvalidOperation(format!(
                "Window ends ({end}) before it starts ({start})"
            )));
        }
        Ok(QueryWindow { start, end })
    }

    /// Whole days: `from` at midnight through the last millisecond of `to`.
    pub fn days(from: NaiveDate, to: NaiveDate) -> OccurResult<Self> {
        Self::new(start_of_day(from), end_of_day(to))
    }

    /// Parse `YYYY-MM-DD` bounds. Missing bounds default to
    /// ±DEFAULT_WINDOW_DAYS around today.
    pub fn from_args(from: Option<&str>, to: Option<&str>) -> OccurResult<Self> {
        let today = Local::now().date_naive();

        let from_date = match from {
            Some(s) => parse_date(s)?,
            None => today - TimeDelta::days(DEFAULT_WINDOW_DAYS),
        };

        let to_date = match to {
            Some(s) => parse_date(s)?,
            None => today + TimeDelta::days(DEFAULT_WINDOW_DAYS),
        };

        Self::days(from_date, to_date)
    }

    /// Inclusive overlap test against an event's `[start, end]`.
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        start <= self.end && end >= self.start
    }
}

impl fmt::Display for QueryWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} .. {}",
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%Y-%m-%d %H:%M")
        )
    }
}

/// Parse YYYY-MM-DD
pub fn parse_date(s: &str) -> OccurResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
        OccurError::InvalidOperation(format!("Invalid date format '{s}'. Expected YYYY-MM-DD"))
    })
}

fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    start_of_day(date) + TimeDelta::days(1) - TimeDelta::milliseconds(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, m: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn test_days_covers_whole_last_day() {
        let window = QueryWindow::days(
            NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 12).unwrap(),
        )
        .unwrap();

        assert_eq!(window.start, dt(2024, 6, 10, 0, 0));
        assert!(window.overlaps(dt(2024, 6, 12, 23, 59), dt(2024, 6, 13, 0, 30)));
        assert!(!window.overlaps(dt(2024, 6, 13, 0, 0), dt(2024, 6, 13, 1, 0)));
    }

    #[test]
    fn test_overlap_is_inclusive_on_both_ends() {
        let window = QueryWindow::new(dt(2024, 6, 10, 9, 0), dt(2024, 6, 10, 17, 0)).unwrap();

        assert!(window.overlaps(dt(2024, 6, 10, 8, 0), dt(2024, 6, 10, 9, 0)));
        assert!(window.overlaps(dt(2024, 6, 10, 17, 0), dt(2024, 6, 10, 18, 0)));
        assert!(!window.overlaps(dt(2024, 6, 10, 7, 0), dt(2024, 6, 10, 8, 59)));
    }

    #[test]
    fn test_new_rejects_inverted_window() {
        assert!(QueryWindow::new(dt(2024, 6, 11, 0, 0), dt(2024, 6, 10, 0, 0)).is_err());
    }

    #[test]
    fn test_from_args_parses_dates() {
        let window = QueryWindow::from_args(Some("2024-06-10"), Some("2024-06-12")).unwrap();
        assert_eq!(window.start, dt(2024, 6, 10, 0, 0));
        assert!(QueryWindow::from_args(Some("10/06/2024"), None).is_err());
    }
}
