//! Recurring weekly working hours.

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;

use crate::error::{CalcError, Result};
use crate::time::{TimeOfDay, resolve_local};

/// A recurring time-of-day interval on one weekday, in one timezone.
///
/// Windows never cross midnight: `start < stop` within the same local day.
/// An overnight shift needs two registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingWindow {
    weekday: Weekday,
    start: TimeOfDay,
    stop: TimeOfDay,
    timezone: Tz,
}

impl WorkingWindow {
    pub fn new(weekday: Weekday, start: TimeOfDay, stop: TimeOfDay, timezone: Tz) -> Result<Self> {
        if start >= stop {
            return Err(CalcError::InvalidWindow {
                start: start.to_string(),
                stop: stop.to_string(),
            });
        }
        Ok(Self {
            weekday,
            start,
            stop,
            timezone,
        })
    }

    pub const fn weekday(&self) -> Weekday {
        self.weekday
    }

    pub const fn start(&self) -> TimeOfDay {
        self.start
    }

    pub const fn stop(&self) -> TimeOfDay {
        self.stop
    }

    pub const fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Absolute bounds of this window on a local calendar date.
    ///
    /// The caller is responsible for passing a date that falls on
    /// [`Self::weekday`]. The close is never before the open; a window lying
    /// wholly inside a DST gap occurs as an empty interval.
    pub fn occurrence_on(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let open = resolve_local(&self.timezone, date.and_time(self.start.as_naive()));
        let close = resolve_local(&self.timezone, date.and_time(self.stop.as_naive()));
        (open, close.max(open))
    }
}

/// Working windows keyed by weekday.
///
/// Windows for the same weekday may overlap; the sweep counts overlapping
/// time once.
#[derive(Debug, Clone, Default)]
pub struct WorkingHours {
    // Indexed by `Weekday::num_days_from_monday`.
    days: [Vec<WorkingWindow>; 7],
}

impl WorkingHours {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a `start`..`stop` window for every weekday in `weekdays`.
    ///
    /// Both times are validated before anything is inserted, so a failed call
    /// leaves the registry unchanged.
    pub fn register<I>(&mut self, weekdays: I, start: &str, stop: &str, timezone: Tz) -> Result<()>
    where
        I: IntoIterator<Item = Weekday>,
    {
        let start: TimeOfDay = start.parse()?;
        let stop: TimeOfDay = stop.parse()?;

        let windows = weekdays
            .into_iter()
            .map(|weekday| WorkingWindow::new(weekday, start, stop, timezone))
            .collect::<Result<Vec<_>>>()?;

        for window in windows {
            tracing::debug!(
                weekday = %window.weekday,
                start = %window.start,
                stop = %window.stop,
                timezone = %window.timezone,
                "registered working window"
            );
            self.days[window.weekday.num_days_from_monday() as usize].push(window);
        }
        Ok(())
    }

    /// Windows registered for `weekday`, in registration order.
    pub fn windows_for(&self, weekday: Weekday) -> &[WorkingWindow] {
        &self.days[weekday.num_days_from_monday() as usize]
    }

    /// Every window, Monday first.
    pub fn iter(&self) -> impl Iterator<Item = &WorkingWindow> {
        self.days.iter().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.days.iter().all(Vec::is_empty)
    }

    /// Distinct timezones used by registered windows.
    pub fn timezones(&self) -> Vec<Tz> {
        let mut zones: Vec<Tz> = self.iter().map(WorkingWindow::timezone).collect();
        zones.sort_by_key(|tz| tz.name());
        zones.dedup();
        zones
    }
}
