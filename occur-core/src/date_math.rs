//! Calendar arithmetic that keeps wall-clock time of day stable.
//!
//! Every helper counts calendar days instead of fixed 24 hour blocks. An
//! occurrence derived from a master keeps the master's hour and minute even
//! when the two dates sit on different sides of a daylight-saving change.

use chrono::{NaiveDateTime, NaiveTime, TimeDelta, Timelike};

/// Format of occurrence ids, e.g. `2024-06-10T00:00:00.000`.
pub const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Start of the calendar day containing `t`.
pub fn normalize_date(t: NaiveDateTime) -> NaiveDateTime {
    t.date().and_time(NaiveTime::MIN)
}

/// Number of calendar days from the day of `a` to the day of `b`.
pub fn day_span(a: NaiveDateTime, b: NaiveDateTime) -> i64 {
    (b.date() - a.date()).num_days()
}

/// Build the timestamp `day_span` calendar days after `base`, with each time
/// component of `base` shifted by the given delta.
///
/// Components carry over the way a wall clock does: hour 25 is 01:00 on the
/// following day, minute -5 is 55 minutes into the previous hour.
pub fn apply_offset(
    base: NaiveDateTime,
    day_span: i64,
    hours: i64,
    minutes: i64,
    seconds: i64,
    nanos: i64,
) -> NaiveDateTime {
    let day = base.date() + TimeDelta::days(day_span);

    day.and_time(NaiveTime::MIN)
        + TimeDelta::hours(i64::from(base.hour()) + hours)
        + TimeDelta::minutes(i64::from(base.minute()) + minutes)
        + TimeDelta::seconds(i64::from(base.second()) + seconds)
        + TimeDelta::nanoseconds(i64::from(base.nanosecond()) + nanos)
}

/// Render a timestamp in the occurrence id format.
pub fn to_iso(t: NaiveDateTime) -> String {
    t.format(ISO_FORMAT).to_string()
}

/// The gap between a master's start and end expressed as calendar days plus
/// per-component time deltas rather than as an elapsed duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallClockOffset {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub nanos: i64,
}

impl WallClockOffset {
    pub fn between(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        WallClockOffset {
            days: day_span(start, end),
            hours: i64::from(end.hour()) - i64::from(start.hour()),
            minutes: i64::from(end.minute()) - i64::from(start.minute()),
            seconds: i64::from(end.second()) - i64::from(start.second()),
            nanos: i64::from(end.nanosecond()) - i64::from(start.nanosecond()),
        }
    }

    /// End of an occurrence starting at `start`.
    pub fn apply(&self, start: NaiveDateTime) -> NaiveDateTime {
        apply_offset(
            start,
            self.days,
            self.hours,
            self.minutes,
            self.seconds,
            self.nanos,
        )
    }
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
    fn test_normalize_date_strips_time_of_day() {
        let t = NaiveDate::from_ymd_opt(2024, 6, 10)
            .unwrap()
            .and_hms_milli_opt(17, 45, 12, 250)
            .unwrap();
        assert_eq!(normalize_date(t), dt(2024, 6, 10, 0, 0));
    }

    #[test]
    fn test_day_span_counts_calendar_days() {
        assert_eq!(day_span(dt(2024, 6, 10, 23, 59), dt(2024, 6, 11, 0, 1)), 1);
        assert_eq!(day_span(dt(2024, 6, 10, 0, 0), dt(2024, 6, 10, 23, 0)), 0);
        assert_eq!(day_span(dt(2024, 2, 28, 9, 0), dt(2024, 3, 1, 9, 0)), 2);
        assert_eq!(day_span(dt(2024, 6, 12, 9, 0), dt(2024, 6, 10, 9, 0)), -2);
    }

    #[test]
    fn test_apply_offset_carries_overflowing_hours() {
        let base = dt(2024, 6, 10, 22, 0);
        assert_eq!(apply_offset(base, 0, 3, 0, 0, 0), dt(2024, 6, 11, 1, 0));
        assert_eq!(apply_offset(base, 2, 0, -30, 0, 0), dt(2024, 6, 12, 21, 30));
    }

    #[test]
    fn test_offset_across_midnight_keeps_wall_clock_end() {
        // 22:00 -> 01:00 next day: one day forward, hour delta of -21.
        let offset = WallClockOffset::between(dt(2024, 3, 8, 22, 0), dt(2024, 3, 9, 1, 0));
        assert_eq!(offset.days, 1);
        assert_eq!(offset.hours, -21);

        assert_eq!(offset.apply(dt(2024, 3, 9, 22, 0)), dt(2024, 3, 10, 1, 0));
        assert_eq!(offset.apply(dt(2024, 11, 2, 22, 0)), dt(2024, 11, 3, 1, 0));
    }

    #[test]
    fn test_offset_on_dst_change_dates_keeps_hour_and_minute() {
        // Master on an ordinary day, occurrences on the US spring-forward and
        // fall-back dates. Wall-clock start and end must be unchanged.
        let offset = WallClockOffset::between(dt(2024, 3, 1, 1, 30), dt(2024, 3, 1, 3, 15));

        for day in [dt(2024, 3, 10, 1, 30), dt(2024, 11, 3, 1, 30)] {
            let end = offset.apply(day);
            assert_eq!(end.hour(), 3);
            assert_eq!(end.minute(), 15);
            assert_eq!(end.date(), day.date());
        }
    }

    #[test]
    fn test_to_iso_uses_millisecond_precision() {
        assert_eq!(to_iso(dt(2024, 6, 10, 0, 0)), "2024-06-10T00:00:00.000");
    }
}
