//! Schedule command for listing configured working windows.

use std::io::Write;

use anyhow::Result;
use serde::Serialize;
use wt_core::{WorkingHours, WorkingWindow};

#[derive(Debug, Serialize)]
struct WindowEntry {
    weekday: String,
    start: String,
    stop: String,
    timezone: String,
}

impl From<&WorkingWindow> for WindowEntry {
    fn from(window: &WorkingWindow) -> Self {
        Self {
            weekday: window.weekday().to_string(),
            start: window.start().to_string(),
            stop: window.stop().to_string(),
            timezone: window.timezone().name().to_string(),
        }
    }
}

pub fn run<W: Write>(writer: &mut W, hours: &WorkingHours, json: bool) -> Result<()> {
    let entries: Vec<WindowEntry> = hours.iter().map(WindowEntry::from).collect();

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&entries)?)?;
        return Ok(());
    }

    if entries.is_empty() {
        writeln!(writer, "No working hours configured.")?;
        return Ok(());
    }

    writeln!(writer, "Working hours:")?;
    for entry in entries {
        writeln!(
            writer,
            "- {} {}-{} {}",
            entry.weekday, entry.start, entry.stop, entry.timezone
        )?;
    }
    Ok(())
}
