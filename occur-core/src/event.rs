//! Master events, occurrences and recurrence patterns.
//!
//! A master is the stored definition of a series. Occurrences share the same
//! `Event` shape but carry `occurrence_id` and are produced by expansion,
//! never stored as masters.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta, Weekday};
use serde::{Deserialize, Serialize};

use crate::date_math::{WallClockOffset, normalize_date, to_iso};
use crate::error::{OccurError, OccurResult};

/// A calendar event: either a master (possibly recurring) or one occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,

    /// RRULE for master events; always `None` on occurrences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<RecurrencePattern>,

    #[serde(default)]
    pub metadata: EventMetadata,

    /// ISO-8601 form of the original (pre-override) date for occurrences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrence_id: Option<String>,
}

/// Optional display and correlation data carried through expansion untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

impl Event {
    pub fn new(id: &str, title: &str, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Event {
            id: id.to_string(),
            title: title.to_string(),
            start,
            end,
            recurrence: None,
            metadata: EventMetadata::default(),
            occurrence_id: None,
        }
    }

    pub fn with_recurrence(mut self, pattern: RecurrencePattern) -> Self {
        self.recurrence = Some(pattern);
        self
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }

    /// Elapsed time between start and end. Only fit for padding heuristics;
    /// derived end times go through [`Event::wall_clock_offset`].
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn wall_clock_offset(&self) -> WallClockOffset {
        WallClockOffset::between(self.start, self.end)
    }

    /// Turn this event into the occurrence of `series_id` originally due on
    /// the day `key`.
    pub fn into_occurrence(mut self, series_id: &str, key: NaiveDateTime) -> Event {
        let occurrence_id = to_iso(key);
        self.id = format!("{series_id}_{occurrence_id}");
        self.occurrence_id = Some(occurrence_id);
        self.recurrence = None;
        self
    }

    pub fn validate(&self) -> OccurResult<()> {
        if self.end < self.start {
            return Err(OccurError::InvalidOperation(format!(
                "Event '{}' ends ({}) before it starts ({})",
                self.id, self.end, self.start
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} - {})",
            self.title,
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%Y-%m-%d %H:%M")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    fn as_rrule(self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
        }
    }
}

impl FromStr for Frequency {
    type Err = OccurError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DAILY" => Ok(Frequency::Daily),
            "WEEKLY" => Ok(Frequency::Weekly),
            "MONTHLY" => Ok(Frequency::Monthly),
            "YEARLY" => Ok(Frequency::Yearly),
            other => Err(OccurError::InvalidRecurrence(format!(
                "Unsupported frequency '{other}'"
            ))),
        }
    }
}

/// A recurrence rule in RRULE terms.
///
/// `by_rules` holds raw `BYxxx=...` parts. They are not interpreted here and
/// are handed to the evaluator verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecurrencePattern {
    pub frequency: Frequency,
    pub interval: u16,
    pub count: Option<u32>,
    pub until: Option<NaiveDateTime>,
    pub week_start: Option<Weekday>,
    pub by_rules: Vec<String>,
}

impl RecurrencePattern {
    pub fn new(frequency: Frequency) -> Self {
        RecurrencePattern {
            frequency,
            interval: 1,
            count: None,
            until: None,
            week_start: None,
            by_rules: Vec::new(),
        }
    }

    pub fn daily() -> Self {
        Self::new(Frequency::Daily)
    }

    pub fn weekly() -> Self {
        Self::new(Frequency::Weekly)
    }

    pub fn interval(mut self, interval: u16) -> Self {
        self.interval = interval;
        self
    }

    pub fn count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    pub fn until(mut self, until: NaiveDateTime) -> Self {
        self.until = Some(until);
        self
    }

    pub fn week_start(mut self, week_start: Weekday) -> Self {
        self.week_start = Some(week_start);
        self
    }

    /// Add a raw `BYxxx=...` part, e.g. `BYDAY=MO,WE`.
    pub fn by_rule(mut self, rule: &str) -> Self {
        self.by_rules.push(rule.to_string());
        self
    }

    /// Copy of this pattern that stops on the day before `date`, keeping an
    /// earlier UNTIL. COUNT is dropped.
    pub fn truncated_before(&self, date: NaiveDateTime) -> Self {
        let cutoff = normalize_date(date) - TimeDelta::seconds(1);
        let mut truncated = self.clone();
        truncated.until = Some(self.until.map_or(cutoff, |until| until.min(cutoff)));
        truncated.count = None;
        truncated
    }

    /// RRULE value with `WKST` always present, falling back to `fallback`
    /// when the pattern does not set its own week start.
    pub fn to_rrule_with_week_start(&self, fallback: Weekday) -> String {
        let mut parts = self.core_parts();
        parts.push(format!(
            "WKST={}",
            weekday_code(self.week_start.unwrap_or(fallback))
        ));
        parts.extend(self.by_rules.iter().cloned());
        parts.join(";")
    }

    fn core_parts(&self) -> Vec<String> {
        let mut parts = vec![format!("FREQ={}", self.frequency.as_rrule())];
        if self.interval != 1 {
            parts.push(format!("INTERVAL={}", self.interval));
        }
        if let Some(count) = self.count {
            parts.push(format!("COUNT={count}"));
        }
        if let Some(until) = self.until {
            parts.push(format!("UNTIL={}", until.format("%Y%m%dT%H%M%SZ")));
        }
        parts
    }
}

impl fmt::Display for RecurrencePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = self.core_parts();
        if let Some(week_start) = self.week_start {
            parts.push(format!("WKST={}", weekday_code(week_start)));
        }
        parts.extend(self.by_rules.iter().cloned());
        write!(f, "{}", parts.join(";"))
    }
}

impl FromStr for RecurrencePattern {
    type Err = OccurError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.trim();
        let body = body.strip_prefix("RRULE:").unwrap_or(body);

        let mut frequency = None;
        let mut pattern = RecurrencePattern::daily();

        for part in body.split(';').filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                OccurError::InvalidRecurrence(format!("Expected KEY=VALUE, got '{part}'"))
            })?;

            match key.to_ascii_uppercase().as_str() {
                "FREQ" => frequency = Some(value.parse::<Frequency>()?),
                "INTERVAL" => {
                    pattern.interval = value.parse().map_err(|_| {
                        OccurError::InvalidRecurrence(format!("Invalid INTERVAL '{value}'"))
                    })?;
                }
                "COUNT" => {
                    pattern.count = Some(value.parse().map_err(|_| {
                        OccurError::InvalidRecurrence(format!("Invalid COUNT '{value}'"))
                    })?);
                }
                "UNTIL" => pattern.until = Some(parse_until(value)?),
                "WKST" => pattern.week_start = Some(parse_weekday_code(value)?),
                k if k.starts_with("BY") => pattern.by_rules.push(part.to_string()),
                other => {
                    return Err(OccurError::InvalidRecurrence(format!(
                        "Unsupported RRULE part '{other}'"
                    )));
                }
            }
        }

        pattern.frequency = frequency
            .ok_or_else(|| OccurError::InvalidRecurrence(format!("Missing FREQ in '{s}'")))?;
        Ok(pattern)
    }
}

impl TryFrom<String> for RecurrencePattern {
    type Error = OccurError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RecurrencePattern> for String {
    fn from(pattern: RecurrencePattern) -> Self {
        pattern.to_string()
    }
}

/// Parse UNTIL as a date-time (`20240614T235959`, optional `Z`) or a date
/// (`20240614`, meaning the end of that day).
fn parse_until(value: &str) -> OccurResult<NaiveDateTime> {
    let trimmed = value.trim_end_matches('Z');

    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y%m%dT%H%M%S") {
        return Ok(dt);
    }

    NaiveDate::parse_from_str(trimmed, "%Y%m%d")
        .ok()
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .ok_or_else(|| OccurError::InvalidRecurrence(format!("Invalid UNTIL '{value}'")))
}

fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

fn parse_weekday_code(code: &str) -> OccurResult<Weekday> {
    match code.to_ascii_uppercase().as_str() {
        "MO" => Ok(Weekday::Mon),
        "TU" => Ok(Weekday::Tue),
        "WE" => Ok(Weekday::Wed),
        "TH" => Ok(Weekday::Thu),
        "FR" => Ok(Weekday::Fri),
        "SA" => Ok(Weekday::Sat),
        "SU" => Ok(Weekday::Sun),
        other => Err(OccurError::InvalidRecurrence(format!(
            "Invalid weekday '{other}'"
        ))),
    }
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
    fn test_parse_full_rrule() {
        let pattern: RecurrencePattern = "RRULE:FREQ=WEEKLY;INTERVAL=2;COUNT=10;WKST=SU;BYDAY=MO,WE"
            .parse()
            .unwrap();

        assert_eq!(pattern.frequency, Frequency::Weekly);
        assert_eq!(pattern.interval, 2);
        assert_eq!(pattern.count, Some(10));
        assert_eq!(pattern.week_start, Some(Weekday::Sun));
        assert_eq!(pattern.by_rules, vec!["BYDAY=MO,WE".to_string()]);
    }

    #[test]
    fn test_parse_until_date_means_end_of_day() {
        let pattern: RecurrencePattern = "FREQ=DAILY;UNTIL=20240614".parse().unwrap();
        assert_eq!(
            pattern.until,
            Some(NaiveDate::from_ymd_opt(2024, 6, 14).unwrap().and_hms_opt(23, 59, 59).unwrap())
        );
    }

    #[test]
    fn test_parse_rejects_missing_freq_and_unknown_parts() {
        assert!("INTERVAL=2".parse::<RecurrencePattern>().is_err());
        assert!("FREQ=DAILY;FOO=1".parse::<RecurrencePattern>().is_err());
        assert!("FREQ=HOURLY".parse::<RecurrencePattern>().is_err());
    }

    #[test]
    fn test_display_parses_back() {
        let pattern = RecurrencePattern::weekly()
            .interval(3)
            .until(dt(2024, 12, 31, 23, 59))
            .week_start(Weekday::Mon)
            .by_rule("BYDAY=TU");

        let text = pattern.to_string();
        assert_eq!(text, "FREQ=WEEKLY;INTERVAL=3;UNTIL=20241231T235900Z;WKST=MO;BYDAY=TU");
        assert_eq!(text.parse::<RecurrencePattern>().unwrap(), pattern);
    }

    #[test]
    fn test_fallback_week_start_only_when_unset() {
        let plain = RecurrencePattern::daily();
        assert_eq!(plain.to_rrule_with_week_start(Weekday::Sun), "FREQ=DAILY;WKST=SU");

        let own = RecurrencePattern::daily().week_start(Weekday::Mon);
        assert_eq!(own.to_rrule_with_week_start(Weekday::Sun), "FREQ=DAILY;WKST=MO");
    }

    #[test]
    fn test_truncated_before_clears_count() {
        let pattern = RecurrencePattern::daily().count(30);
        let truncated = pattern.truncated_before(dt(2024, 6, 15, 9, 0));

        assert_eq!(truncated.count, None);
        assert_eq!(
            truncated.until,
            Some(NaiveDate::from_ymd_opt(2024, 6, 14).unwrap().and_hms_opt(23, 59, 59).unwrap())
        );
    }

    #[test]
    fn test_truncated_before_keeps_earlier_until() {
        let pattern = RecurrencePattern::daily().until(dt(2024, 6, 5, 9, 0));
        let truncated = pattern.truncated_before(dt(2024, 6, 15, 0, 0));
        assert_eq!(truncated.until, Some(dt(2024, 6, 5, 9, 0)));
    }

    #[test]
    fn test_event_validation() {
        let ok = Event::new("a", "A", dt(2024, 6, 1, 9, 0), dt(2024, 6, 1, 9, 0));
        assert!(ok.validate().is_ok());

        let backwards = Event::new("b", "B", dt(2024, 6, 1, 9, 0), dt(2024, 6, 1, 8, 0));
        assert!(matches!(backwards.validate(), Err(OccurError::InvalidOperation(_))));
    }

    #[test]
    fn test_event_recurrence_serializes_as_rrule_text() {
        let event = Event::new("standup", "Standup", dt(2024, 6, 1, 9, 0), dt(2024, 6, 1, 9, 15))
            .with_recurrence(RecurrencePattern::daily());

        let toml_text = toml::to_string(&event).unwrap();
        assert!(toml_text.contains("recurrence = \"FREQ=DAILY\""));

        let parsed: Event = toml::from_str(&toml_text).unwrap();
        assert_eq!(parsed, event);
    }
}
