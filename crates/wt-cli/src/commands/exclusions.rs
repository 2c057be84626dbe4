//! Exclusions command for listing custom and calendar exclusions.

use std::io::Write;

use anyhow::Result;
use chrono::SecondsFormat;
use wt_core::{Exclusion, Exclusions};

fn describe(exclusion: &Exclusion) -> String {
    let label = if exclusion.label.is_empty() {
        "(unlabelled)"
    } else {
        exclusion.label.as_str()
    };
    format!(
        "- {} .. {} {} [{}]",
        exclusion.start.to_rfc3339_opts(SecondsFormat::Secs, true),
        exclusion.end.to_rfc3339_opts(SecondsFormat::Secs, true),
        label,
        exclusion.source
    )
}

pub fn run<W: Write>(writer: &mut W, exclusions: &Exclusions, json: bool) -> Result<()> {
    if json {
        let entries: Vec<&Exclusion> = exclusions.iter().collect();
        writeln!(writer, "{}", serde_json::to_string_pretty(&entries)?)?;
        return Ok(());
    }

    if exclusions.is_empty() {
        writeln!(writer, "No exclusions.")?;
        return Ok(());
    }

    writeln!(writer, "Exclusions:")?;
    for exclusion in exclusions.iter() {
        writeln!(writer, "{}", describe(exclusion))?;
    }
    Ok(())
}
