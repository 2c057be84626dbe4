//! Duration command: working time between two instants.

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use wt_core::{Calculator, Unit, WorkingDuration};

use super::util::{format_amount, format_duration};

#[derive(Debug, Serialize)]
struct DurationReport {
    start: String,
    end: String,
    unit: Unit,
    value: f64,
    milliseconds: i64,
}

impl DurationReport {
    fn new(start: DateTime<Utc>, end: DateTime<Utc>, unit: Unit, duration: WorkingDuration) -> Self {
        Self {
            start: start.to_rfc3339_opts(SecondsFormat::Secs, true),
            end: end.to_rfc3339_opts(SecondsFormat::Secs, true),
            unit,
            value: duration.in_unit(unit),
            milliseconds: duration.as_milliseconds(),
        }
    }
}

pub fn run<W: Write>(
    writer: &mut W,
    calculator: &Calculator,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    unit: Unit,
    json: bool,
) -> Result<()> {
    let duration = calculator.working_duration_between(start, end);
    let report = DurationReport::new(start, end, unit, duration);

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&report)?)?;
    } else {
        writeln!(
            writer,
            "{} {} ({})",
            format_amount(report.value),
            unit,
            format_duration(report.milliseconds)
        )?;
    }
    Ok(())
}
