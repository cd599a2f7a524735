use std::path::Path;

use anyhow::Result;
use occur_core::{EngineConfig, QueryWindow};
use owo_colors::OwoColorize;

use crate::calendar_file::CalendarFile;
use crate::render::render_by_day;

pub fn run(file: &Path, window: QueryWindow, json: bool) -> Result<()> {
    let config = EngineConfig::load()?;
    let mut store = CalendarFile::load(file)?.into_store(&config)?;

    let events = store.get_for_range(&window);
    tracing::info!(%window, count = events.len(), "Expanded calendar");

    if json {
        println!("{}", serde_json::to_string_pretty(&events)?);
        return Ok(());
    }

    if events.is_empty() {
        println!("{}", "No events found".dimmed());
        return Ok(());
    }

    for line in render_by_day(&events) {
        println!("{line}");
    }

    Ok(())
}
