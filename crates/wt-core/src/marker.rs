//! Sweep-line markers.
//!
//! A query is turned into a flat list of typed instants: where working windows
//! open and close, where exclusions begin and end, and where measurement
//! starts and stops. The [`sweep`](crate::sweep) walks this list once.
//!
//! Working windows and exclusions are emitted with their true bounds, never
//! clipped to the query. A window that opened before the query start is then
//! already counted as open when measurement begins.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::exclusion::Exclusions;
use crate::schedule::WorkingHours;

/// What happens at a marker's instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    WorkStart,
    WorkStop,
    ExclusionStart,
    ExclusionStop,
    MeasureStart,
    MeasureStop,
}

impl MarkerKind {
    /// Tie-break for markers sharing an instant.
    ///
    /// Working markers sort before exclusion markers, which sort before
    /// measurement markers. Within each pair the start sorts first, so a depth
    /// counter never drops below zero.
    pub const fn rank(self) -> u8 {
        match self {
            Self::WorkStart => 0,
            Self::WorkStop => 1,
            Self::ExclusionStart => 2,
            Self::ExclusionStop => 3,
            Self::MeasureStart => 4,
            Self::MeasureStop => 5,
        }
    }
}

/// An instantaneous sweep-line event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub kind: MarkerKind,
    pub instant: DateTime<Utc>,
    pub label: String,
}

impl Marker {
    pub fn new(kind: MarkerKind, instant: DateTime<Utc>, label: impl Into<String>) -> Self {
        Self {
            kind,
            instant,
            label: label.into(),
        }
    }

    /// Total order used by the sweep: instant, then [`MarkerKind::rank`].
    pub const fn sort_key(&self) -> (DateTime<Utc>, u8) {
        (self.instant, self.kind.rank())
    }
}

/// Builds the unordered marker list for `[query_start, query_end]`.
///
/// `query_start` must not be after `query_end`.
pub fn generate(
    hours: &WorkingHours,
    exclusions: &Exclusions,
    query_start: DateTime<Utc>,
    query_end: DateTime<Utc>,
) -> Vec<Marker> {
    debug_assert!(query_start <= query_end, "query endpoints must be ordered");
    let mut markers = Vec::new();

    // Days are walked in each window's own zone, from the local date holding
    // the query start to the local date holding the query end. Windows never
    // cross midnight, so nothing outside that range can overlap the query.
    for window in hours.iter() {
        let tz = window.timezone();
        let first = query_start.with_timezone(&tz).date_naive();
        let last = query_end.with_timezone(&tz).date_naive();

        for date in days_between(first, last).filter(|d| d.weekday() == window.weekday()) {
            let (open, close) = window.occurrence_on(date);
            if open == close {
                tracing::trace!(%date, "window falls inside a clock change, skipping");
                continue;
            }
            let label = format!("{date} {}-{}", window.start(), window.stop());
            markers.push(Marker::new(MarkerKind::WorkStart, open, label.clone()));
            markers.push(Marker::new(MarkerKind::WorkStop, close, label));
        }
    }

    for exclusion in exclusions.all_overlapping(query_start, query_end) {
        markers.push(Marker::new(
            MarkerKind::ExclusionStart,
            exclusion.start,
            exclusion.label.clone(),
        ));
        markers.push(Marker::new(
            MarkerKind::ExclusionStop,
            exclusion.end,
            exclusion.label.clone(),
        ));
    }

    markers.push(Marker::new(MarkerKind::MeasureStart, query_start, "measure"));
    markers.push(Marker::new(MarkerKind::MeasureStop, query_end, "measure"));

    tracing::trace!(count = markers.len(), "generated markers");
    markers
}

/// Calendar dates from `first` to `last`, inclusive.
fn days_between(first: NaiveDate, last: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    first.iter_days().take_while(move |date| *date <= last)
}
