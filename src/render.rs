//! Colored terminal rendering for occur-core types.

use chrono::{Local, NaiveDate, NaiveDateTime};
use occur_core::date_math::ISO_FORMAT;
use occur_core::{ChangeKind, ChangeSet, Event};
use owo_colors::OwoColorize;

pub trait Render {
    fn render(&self) -> String;
}

impl Render for Event {
    fn render(&self) -> String {
        let time = format!("{:>7}", self.start.format("%H:%M"));
        let series = self
            .occurrence_id
            .as_deref()
            .and_then(|occurrence_id| self.id.strip_suffix(occurrence_id))
            .and_then(|prefix| prefix.strip_suffix('_'))
            .unwrap_or(&self.id);
        let tag = format!("[{series}]");

        let mut line = format!("  {} {} {}", time, self.title, tag.dimmed());
        if let Some(original) = original_day(self).filter(|d| *d != self.start.date()) {
            let moved = format!("(moved from {})", original.format("%a %b %-d"));
            line.push_str(&format!(" {}", moved.yellow()));
        }
        line
    }
}

impl Render for ChangeSet {
    fn render(&self) -> String {
        let kind = self.kind.to_string();
        let kind = match self.kind {
            ChangeKind::Added => kind.green().to_string(),
            ChangeKind::Removed => kind.red().to_string(),
            _ => kind.yellow().to_string(),
        };
        let ids: Vec<&str> = self.affected_ids.iter().map(String::as_str).collect();

        format!("{} {}", kind, ids.join(", ").dimmed())
    }
}

/// Day an occurrence was originally due, read back from its occurrence id.
fn original_day(event: &Event) -> Option<NaiveDate> {
    let occurrence_id = event.occurrence_id.as_deref()?;
    NaiveDateTime::parse_from_str(occurrence_id, ISO_FORMAT)
        .ok()
        .map(|d| d.date())
}

/// Events grouped under one bold label per day.
pub fn render_by_day(events: &[Event]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_date: Option<NaiveDate> = None;

    for event in events {
        let date = event.start.date();
        if current_date != Some(date) {
            if current_date.is_some() {
                lines.push(String::new());
            }
            lines.push(format_date_label(date).bold().to_string());
            current_date = Some(date);
        }
        lines.push(event.render());
    }

    lines
}

/// Format a date as a human-readable label (e.g. "Today", "Tomorrow", "Wed Feb 25")
fn format_date_label(date: NaiveDate) -> String {
    let today = Local::now().date_naive();

    match (date - today).num_days() {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        _ => date.format("%a %b %-d").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn occurrence(original_day: u32, start_day: u32) -> Event {
        Event::new("standup", "Standup", dt(start_day, 9), dt(start_day, 10))
            .into_occurrence("standup", dt(original_day, 0))
    }

    #[test]
    fn test_render_occurrence_tags_series() {
        let line = occurrence(11, 11).render();

        assert!(line.contains("09:00"));
        assert!(line.contains("[standup]"));
        assert!(!line.contains("moved"));
    }

    #[test]
    fn test_render_moved_occurrence() {
        let line = occurrence(11, 15).render();
        assert!(line.contains("moved from Tue Jun 11"));
    }

    #[test]
    fn test_render_by_day_groups() {
        let events = vec![occurrence(10, 10), occurrence(11, 11), occurrence(12, 11)];
        let lines = render_by_day(&events);

        // Two labels, one blank separator, three events.
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[2], "");
    }
}
