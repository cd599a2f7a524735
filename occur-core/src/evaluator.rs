//! RRULE evaluation boundary.
//!
//! The engine never enumerates a rule itself. It asks a
//! [`RecurrenceEvaluator`] for the raw start times between two instants and
//! layers overrides on top.

use chrono::{NaiveDateTime, Weekday};
use rrule::{RRule, RRuleSet, Tz, Unvalidated};

use crate::event::RecurrencePattern;

/// Enumerates raw occurrence starts of a pattern.
pub trait RecurrenceEvaluator {
    /// Starts of `pattern` anchored at `origin`, ascending, each strictly
    /// after `after` and no later than `before`.
    ///
    /// Uses the pattern's own week start when set, else
    /// `fallback_week_start`. A pattern that cannot be evaluated yields an
    /// empty list rather than an error.
    fn occurrences(
        &self,
        pattern: &RecurrencePattern,
        origin: NaiveDateTime,
        after: NaiveDateTime,
        before: NaiveDateTime,
        fallback_week_start: Weekday,
    ) -> Vec<NaiveDateTime>;
}

/// Evaluator backed by the `rrule` crate.
///
/// Wall-clock timestamps are floating, so they are passed through UTC and
/// read back unchanged.
#[derive(Debug, Clone)]
pub struct RRuleEvaluator {
    limit: u16,
}

impl RRuleEvaluator {
    pub fn new(limit: u16) -> Self {
        RRuleEvaluator { limit }
    }

    fn build_set(
        pattern: &RecurrencePattern,
        origin: NaiveDateTime,
        fallback_week_start: Weekday,
    ) -> Option<RRuleSet> {
        let rrule_str = pattern.to_rrule_with_week_start(fallback_week_start);

        let rrule = match rrule_str.parse::<RRule<Unvalidated>>() {
            Ok(rrule) => rrule,
            Err(err) => {
                tracing::warn!(rrule = %rrule_str, error = %err, "Unparsable RRULE, no occurrences");
                return None;
            }
        };

        match rrule.build(to_rrule_tz(origin)) {
            Ok(set) => Some(set),
            Err(err) => {
                tracing::warn!(rrule = %rrule_str, error = %err, "Invalid RRULE, no occurrences");
                None
            }
        }
    }
}

impl Default for RRuleEvaluator {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_OCCURRENCE_LIMIT)
    }
}

impl RecurrenceEvaluator for RRuleEvaluator {
    fn occurrences(
        &self,
        pattern: &RecurrencePattern,
        origin: NaiveDateTime,
        after: NaiveDateTime,
        before: NaiveDateTime,
        fallback_week_start: Weekday,
    ) -> Vec<NaiveDateTime> {
        if before <= after {
            return Vec::new();
        }

        let Some(set) = Self::build_set(pattern, origin, fallback_week_start) else {
            return Vec::new();
        };

        let result = set
            .after(to_rrule_tz(after))
            .before(to_rrule_tz(before))
            .all(self.limit);

        if result.limited {
            tracing::warn!(
                limit = self.limit,
                rrule = %pattern,
                %after,
                %before,
                "RRULE expansion stopped at the occurrence limit, later dates are missing"
            );
        }

        // Bounds are re-applied here so the contract holds however the
        // crate treats the edges.
        result
            .dates
            .iter()
            .map(|d| d.naive_utc())
            .filter(|t| *t > after && *t <= before)
            .collect()
    }
}

fn to_rrule_tz(t: NaiveDateTime) -> chrono::DateTime<Tz> {
    t.and_utc().with_timezone(&Tz::UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(y: i32, m: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn test_daily_occurrences_between_bounds() {
        let evaluator = RRuleEvaluator::default();
        let dates = evaluator.occurrences(
            &RecurrencePattern::daily(),
            dt(2024, 6, 1, 9, 0),
            dt(2024, 6, 10, 0, 0),
            dt(2024, 6, 12, 23, 59),
            Weekday::Mon,
        );

        assert_eq!(
            dates,
            vec![dt(2024, 6, 10, 9, 0), dt(2024, 6, 11, 9, 0), dt(2024, 6, 12, 9, 0)]
        );
    }

    #[test]
    fn test_after_is_exclusive_and_before_inclusive() {
        let evaluator = RRuleEvaluator::default();
        let dates = evaluator.occurrences(
            &RecurrencePattern::daily(),
            dt(2024, 6, 1, 9, 0),
            dt(2024, 6, 10, 9, 0),
            dt(2024, 6, 12, 9, 0),
            Weekday::Mon,
        );

        assert_eq!(dates, vec![dt(2024, 6, 11, 9, 0), dt(2024, 6, 12, 9, 0)]);
    }

    #[test]
    fn test_count_limits_from_origin() {
        let evaluator = RRuleEvaluator::default();
        let dates = evaluator.occurrences(
            &RecurrencePattern::daily().count(3),
            dt(2024, 6, 1, 9, 0),
            dt(2024, 5, 1, 0, 0),
            dt(2024, 6, 30, 0, 0),
            Weekday::Mon,
        );

        assert_eq!(dates.len(), 3);
        assert_eq!(dates.last(), Some(&dt(2024, 6, 3, 9, 0)));
    }

    #[test]
    fn test_weekly_by_day_rules_are_passed_through() {
        // 2024-06-03 is a Monday.
        let evaluator = RRuleEvaluator::default();
        let dates = evaluator.occurrences(
            &RecurrencePattern::weekly().by_rule("BYDAY=MO,WE"),
            dt(2024, 6, 3, 10, 0),
            dt(2024, 6, 2, 0, 0),
            dt(2024, 6, 9, 23, 59),
            Weekday::Mon,
        );

        assert_eq!(dates, vec![dt(2024, 6, 3, 10, 0), dt(2024, 6, 5, 10, 0)]);
    }

    #[test]
    fn test_long_window_is_not_cut_short() {
        let evaluator = RRuleEvaluator::default();
        let dates = evaluator.occurrences(
            &RecurrencePattern::daily(),
            dt(2024, 1, 1, 9, 0),
            dt(2023, 12, 31, 0, 0),
            dt(2027, 12, 31, 23, 59),
            Weekday::Mon,
        );

        assert_eq!(dates.len(), 1461);
        assert_eq!(dates.last(), Some(&dt(2027, 12, 31, 9, 0)));
    }

    #[test]
    fn test_small_limit_truncates() {
        let evaluator = RRuleEvaluator::new(5);
        let dates = evaluator.occurrences(
            &RecurrencePattern::daily(),
            dt(2024, 1, 1, 9, 0),
            dt(2023, 12, 31, 0, 0),
            dt(2024, 12, 31, 0, 0),
            Weekday::Mon,
        );

        assert_eq!(dates.len(), 5);
    }

    #[test]
    fn test_invalid_pattern_fails_soft() {
        let evaluator = RRuleEvaluator::default();
        let dates = evaluator.occurrences(
            &RecurrencePattern::daily().by_rule("BYDAY=XX"),
            dt(2024, 6, 1, 9, 0),
            dt(2024, 6, 1, 0, 0),
            dt(2024, 6, 30, 0, 0),
            Weekday::Mon,
        );

        assert!(dates.is_empty());
    }
}
