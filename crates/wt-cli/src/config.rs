//! Configuration loading and management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Weekday;
use chrono_tz::Tz;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use wt_calendar::{CalendarSource, SummaryFilter};
use wt_core::{Calculator, parse_timezone, weekday_from_iso};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default IANA zone for windows and calendars that name none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    pub working_hours: Vec<WorkingHoursConfig>,
    pub exclusions: Vec<ExclusionConfig>,
    pub calendars: Vec<CalendarConfig>,
}

/// One `[[working_hours]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHoursConfig {
    pub weekdays: Vec<WeekdaySpec>,
    pub start: String,
    pub stop: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// A weekday as an ISO number (1 = Monday) or a name (`mon`, `Monday`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WeekdaySpec {
    Number(u8),
    Name(String),
}

impl WeekdaySpec {
    pub fn to_weekday(&self) -> Result<Weekday> {
        match self {
            Self::Number(n) => Ok(weekday_from_iso(*n)?),
            Self::Name(name) => name
                .trim()
                .parse::<Weekday>()
                .map_err(|_| anyhow::anyhow!("invalid weekday {name:?}")),
        }
    }
}

/// One `[[exclusions]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionConfig {
    pub start: String,
    pub end: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// One `[[calendars]]` table. Exactly one of `path` and `url` must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarConfig {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Only events whose summary matches this regex are kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<String>,
    /// Events whose summary matches this regex are dropped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // WT_TIMEZONE and friends
        figment = figment.merge(Env::prefixed("WT_"));

        figment.extract()
    }

    /// The configured zone, else the system zone, else UTC.
    pub fn default_timezone(&self) -> Result<Tz> {
        if let Some(name) = &self.timezone {
            return parse_timezone(name).context("invalid `timezone` setting");
        }
        match iana_time_zone::get_timezone() {
            Ok(name) => Ok(parse_timezone(&name).unwrap_or_else(|err| {
                tracing::warn!(%name, error = %err, "unrecognised system timezone, using UTC");
                Tz::UTC
            })),
            Err(err) => {
                tracing::debug!(error = %err, "no system timezone, using UTC");
                Ok(Tz::UTC)
            }
        }
    }

    /// Builds a calculator from the working hours and custom exclusions.
    pub fn build_calculator(&self) -> Result<Calculator> {
        let default_tz = self.default_timezone()?;
        let mut calculator = Calculator::new();

        for (index, hours) in self.working_hours.iter().enumerate() {
            let weekdays = hours
                .weekdays
                .iter()
                .map(WeekdaySpec::to_weekday)
                .collect::<Result<Vec<_>>>()
                .with_context(|| format!("working_hours[{index}]"))?;
            let timezone = timezone_or(hours.timezone.as_deref(), default_tz)
                .with_context(|| format!("working_hours[{index}]"))?;
            calculator
                .register_working_hours(weekdays, &hours.start, &hours.stop, timezone)
                .with_context(|| format!("working_hours[{index}]"))?;
        }

        for (index, exclusion) in self.exclusions.iter().enumerate() {
            calculator
                .add_custom_exclusion(
                    exclusion.start.as_str(),
                    exclusion.end.as_str(),
                    exclusion.label.as_deref(),
                )
                .with_context(|| format!("exclusions[{index}]"))?;
        }

        tracing::debug!(
            windows = calculator.working_hours().iter().count(),
            exclusions = calculator.exclusions().len(),
            "built calculator"
        );
        Ok(calculator)
    }

    /// Describes every configured calendar as a loadable source.
    pub fn calendar_sources(&self) -> Result<Vec<CalendarSource>> {
        let default_tz = self.default_timezone()?;
        self.calendars
            .iter()
            .map(|calendar| {
                calendar
                    .to_source(timezone_or(calendar.timezone.as_deref(), default_tz)?)
                    .with_context(|| format!("calendar {:?}", calendar.id))
            })
            .collect()
    }
}

impl CalendarConfig {
    fn to_source(&self, timezone: Tz) -> Result<CalendarSource> {
        let mut source = match (&self.path, &self.url) {
            (Some(path), None) => CalendarSource::file(&self.id, path),
            (None, Some(url)) => CalendarSource::url(&self.id, url),
            (Some(_), Some(_)) => bail!("set either `path` or `url`, not both"),
            (None, None) => bail!("one of `path` or `url` is required"),
        }
        .with_timezone(timezone);

        if let Some(secs) = self.refresh_secs {
            if self.path.is_some() {
                tracing::warn!(id = %self.id, "file calendars are loaded once; ignoring refresh_secs");
            }
            source = source.with_refresh(Duration::from_secs(secs));
        }

        let filter = SummaryFilter::new(self.include.as_deref(), self.exclude.as_deref())
            .context("invalid include/exclude pattern")?;
        if !filter.is_empty() {
            source = source.with_filter(move |event| filter.matches(event));
        }
        Ok(source)
    }
}

fn timezone_or(name: Option<&str>, fallback: Tz) -> Result<Tz> {
    name.map_or(Ok(fallback), |name| {
        parse_timezone(name).with_context(|| format!("invalid timezone {name:?}"))
    })
}

/// Returns the platform-specific config directory for wt.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("wt"))
}
