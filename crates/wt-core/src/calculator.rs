//! Query facade tying the registries to the sweep engine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::exclusion::{Exclusion, Exclusions};
use crate::marker;
use crate::schedule::WorkingHours;
use crate::sweep;
use crate::time::ToInstant;

/// Unit for reporting a [`WorkingDuration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    #[default]
    Hours,
    Minutes,
    Seconds,
    Milliseconds,
}

impl Unit {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hours => "hours",
            Self::Minutes => "minutes",
            Self::Seconds => "seconds",
            Self::Milliseconds => "milliseconds",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "h" | "hour" | "hours" => Ok(Self::Hours),
            "m" | "min" | "minute" | "minutes" => Ok(Self::Minutes),
            "s" | "sec" | "second" | "seconds" => Ok(Self::Seconds),
            "ms" | "millisecond" | "milliseconds" => Ok(Self::Milliseconds),
            other => Err(format!(
                "unknown unit {other:?} (expected hours, minutes, seconds or milliseconds)"
            )),
        }
    }
}

/// Working time between two instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct WorkingDuration(Duration);

impl WorkingDuration {
    pub const fn as_duration(self) -> Duration {
        self.0
    }

    pub fn as_milliseconds(self) -> i64 {
        self.0.num_milliseconds()
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn as_seconds(self) -> f64 {
        self.as_milliseconds() as f64 / 1_000.0
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn as_minutes(self) -> f64 {
        self.as_milliseconds() as f64 / 60_000.0
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn as_hours(self) -> f64 {
        self.as_milliseconds() as f64 / 3_600_000.0
    }

    /// Value in `unit`; milliseconds are exact, the rest fractional.
    #[allow(clippy::cast_precision_loss)]
    pub fn in_unit(self, unit: Unit) -> f64 {
        match unit {
            Unit::Hours => self.as_hours(),
            Unit::Minutes => self.as_minutes(),
            Unit::Seconds => self.as_seconds(),
            Unit::Milliseconds => self.as_milliseconds() as f64,
        }
    }
}

impl From<WorkingDuration> for Duration {
    fn from(duration: WorkingDuration) -> Self {
        duration.0
    }
}

/// Working hours plus exclusions, queried for elapsed working time.
///
/// Queries only read the registries, so any number may run concurrently
/// against a calculator that is not being mutated.
#[derive(Debug, Clone, Default)]
pub struct Calculator {
    hours: WorkingHours,
    exclusions: Exclusions,
}

impl Calculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `start`..`stop` window (e.g. `"08:30"`, `"17:30"`) in `timezone`
    /// for each weekday given.
    pub fn register_working_hours<I>(
        &mut self,
        weekdays: I,
        start: &str,
        stop: &str,
        timezone: Tz,
    ) -> Result<()>
    where
        I: IntoIterator<Item = Weekday>,
    {
        self.hours.register(weekdays, start, stop, timezone)
    }

    /// Adds a manual exclusion. Endpoints may be datetimes or ISO 8601 strings.
    pub fn add_custom_exclusion(
        &mut self,
        start: impl ToInstant,
        end: impl ToInstant,
        label: Option<&str>,
    ) -> Result<()> {
        self.exclusions
            .add_custom(start, end, label.unwrap_or_default())
    }

    /// Replaces the exclusion set for one calendar source.
    pub fn install_calendar_exclusions(
        &mut self,
        source_id: &str,
        intervals: impl IntoIterator<Item = Exclusion>,
    ) -> usize {
        self.exclusions.install_calendar(source_id, intervals)
    }

    pub fn remove_calendar_exclusions(&mut self, source_id: &str) -> bool {
        self.exclusions.remove_calendar(source_id)
    }

    pub const fn working_hours(&self) -> &WorkingHours {
        &self.hours
    }

    pub const fn exclusions(&self) -> &Exclusions {
        &self.exclusions
    }

    /// Working time between `start` and `end`, in either order.
    pub fn working_duration(
        &self,
        start: impl ToInstant,
        end: impl ToInstant,
    ) -> Result<WorkingDuration> {
        let start = start.to_instant()?;
        let end = end.to_instant()?;
        Ok(self.working_duration_between(start, end))
    }

    /// Infallible form of [`Self::working_duration`] for parsed instants.
    pub fn working_duration_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> WorkingDuration {
        let (start, end) = if start > end { (end, start) } else { (start, end) };
        let markers = marker::generate(&self.hours, &self.exclusions, start, end);
        let total = sweep::accumulate(markers);
        tracing::debug!(%start, %end, total_ms = total.num_milliseconds(), "computed working duration");
        WorkingDuration(total)
    }
}
