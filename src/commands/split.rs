use std::path::Path;

use anyhow::Result;
use chrono::NaiveDateTime;
use occur_core::{EngineConfig, QueryWindow};
use owo_colors::OwoColorize;

use crate::calendar_file::CalendarFile;
use crate::render::{Render, render_by_day};

pub fn run(file: &Path, id: &str, at: NaiveDateTime, window: QueryWindow) -> Result<()> {
    let config = EngineConfig::load()?;
    let mut store = CalendarFile::load(file)?.into_store(&config)?;

    let new_id = store.split_series(id, at)?;
    if let Some(change) = store.last_change() {
        println!("{}", change.render());
    }

    for series_id in [id, new_id.as_str()] {
        println!();
        println!("{}", series_id.bold());

        let occurrences = store.expand(series_id, &window)?;
        if occurrences.is_empty() {
            println!("  {}", "No occurrences in window".dimmed());
            continue;
        }
        for line in render_by_day(&occurrences) {
            println!("  {line}");
        }
    }

    Ok(())
}
