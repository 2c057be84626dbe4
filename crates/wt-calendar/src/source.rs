//! Calendar source descriptions.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use regex::Regex;

use crate::ics::CalendarEvent;

/// Predicate deciding whether a raw event becomes an exclusion.
pub type EventFilter = Arc<dyn Fn(&CalendarEvent) -> bool + Send + Sync>;

/// Where calendar data is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    File(PathBuf),
    Url(String),
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

/// A named calendar whose events become exclusions.
///
/// File sources are read once. URL sources are re-fetched every
/// [`refresh`](Self::with_refresh) interval when one is set.
#[derive(Clone)]
pub struct CalendarSource {
    pub id: String,
    pub location: SourceLocation,
    pub refresh: Option<Duration>,
    /// Zone for floating times and all-day dates.
    pub timezone: Tz,
    filter: Option<EventFilter>,
}

impl fmt::Debug for CalendarSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalendarSource")
            .field("id", &self.id)
            .field("location", &self.location)
            .field("refresh", &self.refresh)
            .field("timezone", &self.timezone)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

impl CalendarSource {
    pub fn new(id: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            id: id.into(),
            location,
            refresh: None,
            timezone: Tz::UTC,
            filter: None,
        }
    }

    pub fn file(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::new(id, SourceLocation::File(path.into()))
    }

    pub fn url(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(id, SourceLocation::Url(url.into()))
    }

    #[must_use]
    pub fn with_refresh(mut self, every: Duration) -> Self {
        self.refresh = Some(every);
        self
    }

    #[must_use]
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    #[must_use]
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&CalendarEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// The interval at which this source is reloaded, if it is reloaded at all.
    pub fn refresh_interval(&self) -> Option<Duration> {
        match self.location {
            SourceLocation::File(_) => None,
            SourceLocation::Url(_) => self.refresh.filter(|every| !every.is_zero()),
        }
    }

    pub fn accepts(&self, event: &CalendarEvent) -> bool {
        self.filter.as_ref().is_none_or(|filter| filter(event))
    }
}

/// Include/exclude patterns over event summaries.
///
/// An event passes when it matches `include` (if set) and does not match
/// `exclude` (if set).
#[derive(Debug, Clone, Default)]
pub struct SummaryFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl SummaryFilter {
    /// # Errors
    ///
    /// Returns an error if either pattern is not a valid regex.
    pub fn new(include: Option<&str>, exclude: Option<&str>) -> Result<Self, regex::Error> {
        Ok(Self {
            include: include.map(Regex::new).transpose()?,
            exclude: exclude.map(Regex::new).transpose()?,
        })
    }

    pub const fn is_empty(&self) -> bool {
        self.include.is_none() && self.exclude.is_none()
    }

    pub fn matches(&self, event: &CalendarEvent) -> bool {
        let included = self
            .include
            .as_ref()
            .is_none_or(|re| re.is_match(&event.summary));
        let excluded = self
            .exclude
            .as_ref()
            .is_some_and(|re| re.is_match(&event.summary));
        included && !excluded
    }
}
