//! Parsing of times of day, weekdays, instants and timezones.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{
    DateTime, Duration, FixedOffset, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Timelike,
    Utc, Weekday,
};
use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CalcError, Result};

/// Pre-compiled pattern for `H:MM`, `HH:MM:SS` and `HH:MM:SS.mmm`.
static TIME_OF_DAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2}):(\d{2})(?::(\d{2})(?:\.(\d{1,3}))?)?$").unwrap()
});

/// A wall-clock time within a single day, with millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    /// Creates a time of day from its components.
    pub fn new(hour: u32, minute: u32, second: u32, millisecond: u32) -> Result<Self> {
        NaiveTime::from_hms_milli_opt(hour, minute, second, millisecond)
            // Leap-second representation is not a valid wall-clock input.
            .filter(|_| second < 60 && millisecond < 1000)
            .map(Self)
            .ok_or_else(|| CalcError::InvalidTimeFormat {
                value: format!("{hour:02}:{minute:02}:{second:02}.{millisecond:03}"),
            })
    }

    pub fn hour(self) -> u32 {
        self.0.hour()
    }

    pub fn minute(self) -> u32 {
        self.0.minute()
    }

    pub fn second(self) -> u32 {
        self.0.second()
    }

    pub fn millisecond(self) -> u32 {
        self.0.nanosecond() / 1_000_000
    }

    /// The time as a chrono value, for combining with a date.
    pub const fn as_naive(self) -> NaiveTime {
        self.0
    }
}

impl FromStr for TimeOfDay {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || CalcError::InvalidTimeFormat {
            value: s.to_string(),
        };
        let caps = TIME_OF_DAY_RE.captures(s.trim()).ok_or_else(invalid)?;

        let component = |index: usize| -> Result<u32> {
            caps.get(index)
                .map_or(Ok(0), |m| m.as_str().parse().map_err(|_| invalid()))
        };
        // ".5" means 500 ms, not 5 ms.
        let millisecond = caps.get(4).map_or(Ok(0), |m| {
            format!("{:0<3}", m.as_str()).parse().map_err(|_| invalid())
        })?;

        Self::new(component(1)?, component(2)?, component(3)?, millisecond).map_err(|_| invalid())
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())?;
        if self.second() != 0 || self.millisecond() != 0 {
            write!(f, ":{:02}", self.second())?;
        }
        if self.millisecond() != 0 {
            write!(f, ".{:03}", self.millisecond())?;
        }
        Ok(())
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = CalcError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(time: TimeOfDay) -> Self {
        time.to_string()
    }
}

/// Maps an ISO weekday number (1 = Monday ... 7 = Sunday) to a [`Weekday`].
pub const fn weekday_from_iso(number: u8) -> Result<Weekday> {
    match number {
        1 => Ok(Weekday::Mon),
        2 => Ok(Weekday::Tue),
        3 => Ok(Weekday::Wed),
        4 => Ok(Weekday::Thu),
        5 => Ok(Weekday::Fri),
        6 => Ok(Weekday::Sat),
        7 => Ok(Weekday::Sun),
        other => Err(CalcError::InvalidWeekday(other)),
    }
}

/// Parses an IANA timezone identifier such as `Europe/London`.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse()
        .map_err(|_| CalcError::InvalidTimezone(name.to_string()))
}

/// Parses an ISO 8601 datetime with an explicit offset into a UTC instant.
///
/// Accepts RFC 3339 (`2020-10-02T17:25:00+01:00`, `...Z`) and the space
/// separated variant (`2020-10-02 17:25:00+01:00`).
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();
    DateTime::parse_from_rfc3339(trimmed)
        .or_else(|_| trimmed.parse::<DateTime<FixedOffset>>())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| CalcError::InvalidDateFormat {
            value: value.to_string(),
        })
}

/// Anything that can name an absolute instant: native datetimes or strings.
pub trait ToInstant {
    fn to_instant(&self) -> Result<DateTime<Utc>>;
}

impl<Z: TimeZone> ToInstant for DateTime<Z> {
    fn to_instant(&self) -> Result<DateTime<Utc>> {
        Ok(self.with_timezone(&Utc))
    }
}

impl ToInstant for str {
    fn to_instant(&self) -> Result<DateTime<Utc>> {
        parse_instant(self)
    }
}

impl ToInstant for String {
    fn to_instant(&self) -> Result<DateTime<Utc>> {
        parse_instant(self)
    }
}

impl<T: ToInstant + ?Sized> ToInstant for &T {
    fn to_instant(&self) -> Result<DateTime<Utc>> {
        (**self).to_instant()
    }
}

/// Resolves a wall-clock datetime in `tz` to an absolute instant.
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant. Times that
/// do not exist (DST spring-forward) resolve to the end of the gap, the first
/// instant the zone shows again.
pub fn resolve_local<Z: TimeZone>(tz: &Z, naive: NaiveDateTime) -> DateTime<Utc> {
    if let Some(instant) = earliest(tz, naive) {
        return instant;
    }
    // Transitions fall on whole minutes, so the gap ends on the first valid
    // minute after `naive`.
    let mut candidate = naive.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(naive);
    for _ in 0..MAX_GAP_MINUTES {
        candidate += Duration::minutes(1);
        if let Some(instant) = earliest(tz, candidate) {
            return instant;
        }
    }
    // No real zone has a gap this long.
    Utc.from_utc_datetime(&naive)
}

/// Samoa skipped a whole day in 2011; nothing else comes close.
const MAX_GAP_MINUTES: u32 = 48 * 60;

fn earliest<Z: TimeZone>(tz: &Z, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Some(dt.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn naive(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn parses_hours_and_minutes() {
        let time: TimeOfDay = "08:30".parse().unwrap();
        assert_eq!((time.hour(), time.minute(), time.second()), (8, 30, 0));
        assert_eq!(time.millisecond(), 0);
    }

    #[test]
    fn parses_single_digit_hour_and_seconds() {
        let time: TimeOfDay = "9:05:07".parse().unwrap();
        assert_eq!((time.hour(), time.minute(), time.second()), (9, 5, 7));
    }

    #[test]
    fn parses_fractional_milliseconds() {
        assert_eq!("17:30:00.250".parse::<TimeOfDay>().unwrap().millisecond(), 250);
        assert_eq!("17:30:00.5".parse::<TimeOfDay>().unwrap().millisecond(), 500);
    }

    #[test]
    fn rejects_malformed_times() {
        for bad in ["", "8", "830", "08:3", "24:00", "12:60", "12:00:60", "ab:cd", "08:30pm"] {
            let err = bad.parse::<TimeOfDay>().unwrap_err();
            assert!(
                matches!(err, CalcError::InvalidTimeFormat { .. }),
                "{bad:?} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn display_omits_zero_seconds() {
        assert_eq!("8:30".parse::<TimeOfDay>().unwrap().to_string(), "08:30");
        assert_eq!("08:30:15".parse::<TimeOfDay>().unwrap().to_string(), "08:30:15");
        assert_eq!(
            "08:30:00.120".parse::<TimeOfDay>().unwrap().to_string(),
            "08:30:00.120"
        );
    }

    #[test]
    fn time_of_day_deserializes_from_string() {
        let time: TimeOfDay = serde_json::from_str("\"17:30\"").unwrap();
        assert_eq!(time, TimeOfDay::new(17, 30, 0, 0).unwrap());
        assert!(serde_json::from_str::<TimeOfDay>("\"5pm\"").is_err());
    }

    #[test]
    fn iso_weekday_numbers() {
        assert_eq!(weekday_from_iso(1).unwrap(), Weekday::Mon);
        assert_eq!(weekday_from_iso(7).unwrap(), Weekday::Sun);
        assert_eq!(weekday_from_iso(0), Err(CalcError::InvalidWeekday(0)));
        assert_eq!(weekday_from_iso(8), Err(CalcError::InvalidWeekday(8)));
    }

    #[test]
    fn parses_instants_with_offsets() {
        let instant = parse_instant("2020-10-02T17:25:00+01:00").unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2020, 10, 2, 16, 25, 0).unwrap());

        let spaced = parse_instant("2020-10-02 17:25:00+01:00").unwrap();
        assert_eq!(spaced, instant);

        let zulu = parse_instant("2020-10-02T16:25:00Z").unwrap();
        assert_eq!(zulu, instant);
    }

    #[test]
    fn rejects_instants_without_offset() {
        for bad in ["2020-10-02T17:25:00", "2020-10-02", "yesterday", ""] {
            assert!(
                matches!(parse_instant(bad), Err(CalcError::InvalidDateFormat { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn to_instant_accepts_strings_and_datetimes() {
        let expected = Utc.with_ymd_and_hms(2020, 8, 31, 7, 30, 0).unwrap();
        assert_eq!("2020-08-31T08:30:00+01:00".to_instant().unwrap(), expected);
        assert_eq!(
            String::from("2020-08-31T08:30:00+01:00").to_instant().unwrap(),
            expected
        );
        let london = chrono_tz::Europe::London
            .with_ymd_and_hms(2020, 8, 31, 8, 30, 0)
            .unwrap();
        assert_eq!(london.to_instant().unwrap(), expected);
    }

    #[test]
    fn resolves_ambiguous_local_time_to_earlier_instant() {
        // 2020-10-25 01:30 happens twice in London.
        let resolved = resolve_local(&chrono_tz::Europe::London, naive(2020, 10, 25, 1, 30));
        assert_eq!(resolved, Utc.with_ymd_and_hms(2020, 10, 25, 0, 30, 0).unwrap());
    }

    #[test]
    fn resolves_nonexistent_local_time_to_the_gap_end() {
        // 2020-03-29 01:30 does not exist in London; clocks jump 01:00 -> 02:00.
        let gap_end = Utc.with_ymd_and_hms(2020, 3, 29, 1, 0, 0).unwrap();
        let london = chrono_tz::Europe::London;
        assert_eq!(resolve_local(&london, naive(2020, 3, 29, 1, 30)), gap_end);
        assert_eq!(resolve_local(&london, naive(2020, 3, 29, 1, 0)), gap_end);
        assert_eq!(resolve_local(&london, naive(2020, 3, 29, 1, 59)), gap_end);
        assert_eq!(resolve_local(&london, naive(2020, 3, 29, 2, 0)), gap_end);
    }

    #[test]
    fn resolution_never_reorders_local_times() {
        let london = chrono_tz::Europe::London;
        let instants: Vec<_> = (0..24 * 60)
            .map(|minute| {
                let local = naive(2020, 3, 29, 0, 0) + Duration::minutes(minute);
                resolve_local(&london, local)
            })
            .collect();
        assert!(instants.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn parses_timezones() {
        assert_eq!(parse_timezone("Europe/London").unwrap(), chrono_tz::Europe::London);
        assert_eq!(
            parse_timezone("Mars/Olympus"),
            Err(CalcError::InvalidTimezone("Mars/Olympus".to_string()))
        );
    }
}
