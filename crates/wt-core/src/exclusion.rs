//! Exclusion intervals: holidays and blackout periods that never count as
//! working time.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{CalcError, Result};
use crate::time::ToInstant;

/// Where an exclusion came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExclusionSource {
    /// Added by hand; lives as long as the registry.
    Custom,
    /// Installed from a calendar source; replaced on every refresh.
    Calendar { source_id: String },
}

impl fmt::Display for ExclusionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom => write!(f, "custom"),
            Self::Calendar { source_id } => write!(f, "calendar:{source_id}"),
        }
    }
}

/// An absolute `[start, end)` interval during which time never counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exclusion {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub label: String,
    pub source: ExclusionSource,
}

impl Exclusion {
    /// Creates an exclusion, enforcing `start < end`.
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        label: impl Into<String>,
        source: ExclusionSource,
    ) -> Result<Self> {
        if start >= end {
            return Err(CalcError::InvalidRange { start, end });
        }
        Ok(Self {
            start,
            end,
            label: label.into(),
            source,
        })
    }

    /// Whether `[start, end)` intersects `[query_start, query_end)`.
    pub fn overlaps(&self, query_start: DateTime<Utc>, query_end: DateTime<Utc>) -> bool {
        self.start < query_end && self.end > query_start
    }
}

/// Custom exclusions plus one replaceable set per calendar source.
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    custom: Vec<Exclusion>,
    calendars: BTreeMap<String, Vec<Exclusion>>,
}

impl Exclusions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a custom exclusion. Duplicates and overlaps are kept as-is.
    pub fn add_custom(
        &mut self,
        start: impl ToInstant,
        end: impl ToInstant,
        label: impl Into<String>,
    ) -> Result<()> {
        let exclusion = Exclusion::new(
            start.to_instant()?,
            end.to_instant()?,
            label,
            ExclusionSource::Custom,
        )?;
        tracing::debug!(
            start = %exclusion.start,
            end = %exclusion.end,
            label = %exclusion.label,
            "added custom exclusion"
        );
        self.custom.push(exclusion);
        Ok(())
    }

    /// Replaces everything previously installed under `source_id`.
    ///
    /// The source of every interval is rewritten to this calendar. Intervals
    /// that do not end after they start are dropped. Returns how many were
    /// installed.
    pub fn install_calendar(
        &mut self,
        source_id: &str,
        intervals: impl IntoIterator<Item = Exclusion>,
    ) -> usize {
        let intervals: Vec<Exclusion> = intervals
            .into_iter()
            .filter_map(|exclusion| {
                let source = ExclusionSource::Calendar {
                    source_id: source_id.to_string(),
                };
                match Exclusion::new(exclusion.start, exclusion.end, exclusion.label, source) {
                    Ok(exclusion) => Some(exclusion),
                    Err(err) => {
                        tracing::warn!(source_id, error = %err, "dropping invalid calendar exclusion");
                        None
                    }
                }
            })
            .collect();
        let count = intervals.len();
        let previous = self.calendars.insert(source_id.to_string(), intervals);
        tracing::debug!(
            source_id,
            count,
            replaced = previous.as_ref().map_or(0, Vec::len),
            "installed calendar exclusions"
        );
        count
    }

    /// Drops the set installed under `source_id`, returning whether one existed.
    pub fn remove_calendar(&mut self, source_id: &str) -> bool {
        self.calendars.remove(source_id).is_some()
    }

    /// Ids of every installed calendar source, sorted.
    pub fn calendar_sources(&self) -> impl Iterator<Item = &str> {
        self.calendars.keys().map(String::as_str)
    }

    /// Every exclusion: custom ones first, then calendars by source id.
    pub fn iter(&self) -> impl Iterator<Item = &Exclusion> {
        self.custom.iter().chain(self.calendars.values().flatten())
    }

    /// Every exclusion intersecting `[query_start, query_end)`.
    pub fn all_overlapping(
        &self,
        query_start: DateTime<Utc>,
        query_end: DateTime<Utc>,
    ) -> impl Iterator<Item = &Exclusion> {
        self.iter()
            .filter(move |exclusion| exclusion.overlaps(query_start, query_end))
    }

    pub fn len(&self) -> usize {
        self.custom.len() + self.calendars.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
