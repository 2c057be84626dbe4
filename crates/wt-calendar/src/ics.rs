//! Minimal iCalendar (RFC 5545) reader for `VEVENT` components.
//!
//! Only what exclusion intervals need is extracted: bounds, summary and a few
//! descriptive fields for filtering. Recurrence rules are not expanded.

use std::sync::LazyLock;

use chrono::{DateTime, Days, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use regex::Regex;
use thiserror::Error;
use wt_core::resolve_local;

/// Pre-compiled pattern for `DURATION` values (`P1W`, `P1DT2H30M`, `PT15M`).
static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-])?P(?:(\d+)W|(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?)$").unwrap()
});

/// Errors from reading calendar data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IcsError {
    /// A content line inside an event had no `:` separator.
    #[error("line {line}: malformed content line")]
    MalformedLine { line: usize },
    /// A `DTSTART`/`DTEND` value could not be parsed.
    #[error("line {line}: invalid date-time {value:?}")]
    InvalidDateTime { line: usize, value: String },
    /// A `DURATION` value could not be parsed.
    #[error("line {line}: invalid duration {value:?}")]
    InvalidDuration { line: usize, value: String },
    /// A `BEGIN:VEVENT` without its `END:VEVENT`.
    #[error("line {line}: event is never closed")]
    UnterminatedEvent { line: usize },
}

/// A raw calendar event, before conversion to an exclusion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub uid: Option<String>,
    pub summary: String,
    pub description: Option<String>,
    pub categories: Vec<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Whether the event was given as whole dates (`VALUE=DATE`).
    pub all_day: bool,
}

/// Parses every top-level `VEVENT` in `text`.
///
/// Floating times and all-day dates are interpreted in `timezone`.
pub fn parse(text: &str, timezone: Tz) -> Result<Vec<CalendarEvent>, IcsError> {
    let mut events = Vec::new();
    let mut current: Option<EventBuilder> = None;
    // Depth of components nested inside the current event (VALARM etc).
    let mut nested = 0usize;

    for (line_no, line) in unfold(text) {
        let Some(content) = ContentLine::parse(&line) else {
            if current.is_some() {
                return Err(IcsError::MalformedLine { line: line_no });
            }
            continue;
        };
        let is_event = content.value.trim().eq_ignore_ascii_case("VEVENT");

        match content.name.as_str() {
            "BEGIN" if current.is_none() => {
                if is_event {
                    current = Some(EventBuilder::new(line_no));
                }
            }
            "BEGIN" => nested += 1,
            "END" if current.is_some() && nested > 0 => nested -= 1,
            "END" if is_event => {
                if let Some(builder) = current.take() {
                    if let Some(event) = builder.finish(timezone)? {
                        events.push(event);
                    }
                }
            }
            _ => {
                if let Some(builder) = current.as_mut() {
                    if nested == 0 {
                        builder.apply(&content, line_no, timezone)?;
                    }
                }
            }
        }
    }

    if let Some(builder) = current {
        return Err(IcsError::UnterminatedEvent {
            line: builder.line,
        });
    }
    Ok(events)
}

/// Joins folded continuation lines, keeping the number of each logical
/// line's first physical line.
fn unfold(text: &str) -> Vec<(usize, String)> {
    let mut lines: Vec<(usize, String)> = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        if let Some(rest) = raw.strip_prefix([' ', '\t']) {
            if let Some((_, last)) = lines.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        if !raw.trim().is_empty() {
            lines.push((index + 1, raw.to_string()));
        }
    }
    lines
}

/// `NAME;PARAM=VALUE;...:value`
#[derive(Debug)]
struct ContentLine<'a> {
    name: String,
    params: Vec<(String, String)>,
    value: &'a str,
}

impl<'a> ContentLine<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let colon = find_unquoted(line, ':')?;
        let (head, value) = (&line[..colon], &line[colon + 1..]);

        let mut parts = split_unquoted(head, ';').into_iter();
        let name = parts.next()?.trim().to_ascii_uppercase();
        if name.is_empty() {
            return None;
        }
        let params = parts
            .filter_map(|param| {
                let (key, value) = param.split_once('=')?;
                Some((key.trim().to_ascii_uppercase(), value.trim_matches('"').to_string()))
            })
            .collect();

        Some(Self {
            name,
            params,
            value,
        })
    }

    fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

fn find_unquoted(s: &str, separator: char) -> Option<usize> {
    let mut quoted = false;
    for (index, c) in s.char_indices() {
        if c == '"' {
            quoted = !quoted;
        } else if c == separator && !quoted {
            return Some(index);
        }
    }
    None
}

fn split_unquoted(s: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = s;
    while let Some(index) = find_unquoted(rest, separator) {
        parts.push(&rest[..index]);
        rest = &rest[index + separator.len_utf8()..];
    }
    parts.push(rest);
    parts
}

/// Undoes TEXT escaping and splits on unescaped `separator` if given.
fn unescape_list(value: &str, separator: Option<char>) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n' | 'N') => current.push('\n'),
                Some(other) => current.push(other),
                None => current.push('\\'),
            },
            c if Some(c) == separator => items.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    items.push(current);
    items
}

fn unescape(value: &str) -> String {
    unescape_list(value, None).concat()
}

/// A `DTSTART`/`DTEND` before the event's timezone is applied to dates.
#[derive(Debug, Clone, Copy)]
enum DateValue {
    Date(NaiveDate),
    Instant(DateTime<Utc>),
}

fn parse_date_value(
    content: &ContentLine<'_>,
    line: usize,
    timezone: Tz,
) -> Result<DateValue, IcsError> {
    let value = content.value.trim();
    let invalid = || IcsError::InvalidDateTime {
        line,
        value: value.to_string(),
    };

    let is_date = content
        .param("VALUE")
        .is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
        || (value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()));
    if is_date {
        return NaiveDate::parse_from_str(value, "%Y%m%d")
            .map(DateValue::Date)
            .map_err(|_| invalid());
    }

    if let Some(utc) = value.strip_suffix(['Z', 'z']) {
        return NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
            .map(|naive| DateValue::Instant(naive.and_utc()))
            .map_err(|_| invalid());
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").map_err(|_| invalid())?;
    let zone = match content.param("TZID") {
        Some(tzid) => tzid.parse::<Tz>().unwrap_or_else(|_| {
            tracing::warn!(tzid, line, fallback = %timezone, "unknown TZID, using calendar timezone");
            timezone
        }),
        None => timezone,
    };
    Ok(DateValue::Instant(resolve_local(&zone, naive)))
}

fn parse_duration(value: &str, line: usize) -> Result<Duration, IcsError> {
    let invalid = || IcsError::InvalidDuration {
        line,
        value: value.to_string(),
    };
    let caps = DURATION_RE.captures(value.trim()).ok_or_else(invalid)?;
    if (2..=6).all(|index| caps.get(index).is_none()) {
        return Err(invalid());
    }

    let number = |index: usize| -> Result<i64, IcsError> {
        caps.get(index)
            .map_or(Ok(0), |m| m.as_str().parse().map_err(|_| invalid()))
    };
    let parts = [
        Duration::try_weeks(number(2)?),
        Duration::try_days(number(3)?),
        Duration::try_hours(number(4)?),
        Duration::try_minutes(number(5)?),
        Duration::try_seconds(number(6)?),
    ];
    let total = parts
        .into_iter()
        .try_fold(Duration::zero(), |total, part| total.checked_add(&part?))
        .ok_or_else(invalid)?;

    if caps.get(1).is_some_and(|sign| sign.as_str() == "-") {
        Duration::zero().checked_sub(&total).ok_or_else(invalid)
    } else {
        Ok(total)
    }
}

fn midnight(date: NaiveDate, timezone: Tz) -> DateTime<Utc> {
    resolve_local(&timezone, date.and_time(NaiveTime::default()))
}

#[derive(Debug, Default)]
struct EventBuilder {
    line: usize,
    uid: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    categories: Vec<String>,
    start: Option<DateValue>,
    end: Option<DateValue>,
    duration: Option<Duration>,
    // Line and raw text of DURATION, for errors raised when it is applied.
    duration_source: Option<(usize, String)>,
}

impl EventBuilder {
    fn new(line: usize) -> Self {
        Self {
            line,
            ..Self::default()
        }
    }

    fn apply(&mut self, content: &ContentLine<'_>, line: usize, timezone: Tz) -> Result<(), IcsError> {
        match content.name.as_str() {
            "UID" => self.uid = Some(content.value.trim().to_string()),
            "SUMMARY" => self.summary = Some(unescape(content.value)),
            "DESCRIPTION" => self.description = Some(unescape(content.value)),
            "CATEGORIES" => self.categories.extend(
                unescape_list(content.value, Some(','))
                    .into_iter()
                    .map(|category| category.trim().to_string())
                    .filter(|category| !category.is_empty()),
            ),
            "DTSTART" => self.start = Some(parse_date_value(content, line, timezone)?),
            "DTEND" => self.end = Some(parse_date_value(content, line, timezone)?),
            "DURATION" => {
                self.duration = Some(parse_duration(content.value, line)?);
                self.duration_source = Some((line, content.value.trim().to_string()));
            }
            "RRULE" | "RDATE" => {
                tracing::debug!(line, "recurrence is not expanded; using the first occurrence");
            }
            _ => {}
        }
        Ok(())
    }

    /// Builds the event, or `None` when it has no start.
    fn finish(self, timezone: Tz) -> Result<Option<CalendarEvent>, IcsError> {
        let Some(start_value) = self.start else {
            tracing::warn!(line = self.line, uid = ?self.uid, "skipping event without DTSTART");
            return Ok(None);
        };
        let (duration_line, duration_value) = self.duration_source.unwrap_or((self.line, String::new()));
        let out_of_range = || IcsError::InvalidDuration {
            line: duration_line,
            value: duration_value.clone(),
        };

        let start = match start_value {
            DateValue::Date(date) => midnight(date, timezone),
            DateValue::Instant(instant) => instant,
        };
        let end = match (self.end, self.duration, start_value) {
            (Some(DateValue::Date(date)), _, _) => midnight(date, timezone),
            (Some(DateValue::Instant(instant)), _, _) => instant,
            // Whole-day durations on dates follow the calendar, not 24h blocks.
            (None, Some(duration), DateValue::Date(date))
                if duration.num_seconds() % 86_400 == 0 && duration.num_days() >= 0 =>
            {
                let days = u64::try_from(duration.num_days()).unwrap_or_default();
                let last = date.checked_add_days(Days::new(days)).ok_or_else(out_of_range)?;
                midnight(last, timezone)
            }
            (None, Some(duration), _) => start.checked_add_signed(duration).ok_or_else(out_of_range)?,
            (None, None, DateValue::Date(date)) => match date.checked_add_days(Days::new(1)) {
                Some(next) => midnight(next, timezone),
                None => start,
            },
            (None, None, DateValue::Instant(_)) => start,
        };

        Ok(Some(CalendarEvent {
            uid: self.uid,
            summary: self.summary.unwrap_or_default(),
            description: self.description,
            categories: self.categories,
            start,
            end,
            all_day: matches!(start_value, DateValue::Date(_)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Europe::London;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    const BANK_HOLIDAYS: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//example//holidays//EN\r\n\
BEGIN:VEVENT\r\n\
UID:2020-08-31-summer@example\r\n\
SUMMARY:Summer bank holiday\r\n\
DTSTART;VALUE=DATE:20200831\r\n\
DTEND;VALUE=DATE:20200901\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:2020-12-25-christmas@example\r\n\
SUMMARY:Christmas Day\r\n\
DTSTART;VALUE=DATE:20201225\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[test]
    fn parses_all_day_events_in_calendar_timezone() {
        let events = parse(BANK_HOLIDAYS, London).unwrap();

        assert_eq!(events.len(), 2);
        let summer = &events[0];
        assert_eq!(summer.summary, "Summer bank holiday");
        assert_eq!(summer.uid.as_deref(), Some("2020-08-31-summer@example"));
        assert!(summer.all_day);
        // Midnight BST.
        assert_eq!(summer.start, utc(2020, 8, 30, 23, 0));
        assert_eq!(summer.end, utc(2020, 8, 31, 23, 0));
    }

    #[test]
    fn all_day_event_without_end_lasts_one_day() {
        let events = parse(BANK_HOLIDAYS, London).unwrap();
        let christmas = &events[1];
        assert_eq!(christmas.start, utc(2020, 12, 25, 0, 0));
        assert_eq!(christmas.end, utc(2020, 12, 26, 0, 0));
    }

    #[test]
    fn parses_utc_tzid_and_floating_times() {
        let text = "BEGIN:VEVENT\n\
SUMMARY:utc\n\
DTSTART:20201002T160000Z\n\
DTEND:20201002T170000Z\n\
END:VEVENT\n\
BEGIN:VEVENT\n\
SUMMARY:tzid\n\
DTSTART;TZID=America/New_York:20201002T090000\n\
DTEND;TZID=America/New_York:20201002T100000\n\
END:VEVENT\n\
BEGIN:VEVENT\n\
SUMMARY:floating\n\
DTSTART:20201002T090000\n\
DTEND:20201002T100000\n\
END:VEVENT\n";
        let events = parse(text, London).unwrap();

        assert_eq!(events[0].start, utc(2020, 10, 2, 16, 0));
        assert_eq!(events[1].start, utc(2020, 10, 2, 13, 0));
        assert_eq!(events[2].start, utc(2020, 10, 2, 8, 0));
        assert!(events.iter().all(|event| !event.all_day));
    }

    #[test]
    fn unknown_tzid_falls_back_to_calendar_timezone() {
        let text = "BEGIN:VEVENT\n\
DTSTART;TZID=\"GMT Standard Time\":20201002T090000\n\
DTEND;TZID=\"GMT Standard Time\":20201002T100000\n\
END:VEVENT\n";
        let events = parse(text, London).unwrap();
        assert_eq!(events[0].start, utc(2020, 10, 2, 8, 0));
    }

    #[test]
    fn duration_is_used_when_end_is_missing() {
        let text = "BEGIN:VEVENT\n\
DTSTART:20201002T090000Z\n\
DURATION:PT1H30M\n\
END:VEVENT\n\
BEGIN:VEVENT\n\
DTSTART;VALUE=DATE:20201026\n\
DURATION:P1W\n\
END:VEVENT\n";
        let events = parse(text, London).unwrap();
        assert_eq!(events[0].end, utc(2020, 10, 2, 10, 30));
        assert_eq!(events[1].start, utc(2020, 10, 26, 0, 0));
        assert_eq!(events[1].end, utc(2020, 11, 2, 0, 0));
    }

    #[test]
    fn timed_event_without_end_is_zero_length() {
        let text = "BEGIN:VEVENT\nDTSTART:20201002T090000Z\nEND:VEVENT\n";
        let events = parse(text, London).unwrap();
        assert_eq!(events[0].start, events[0].end);
    }

    #[test]
    fn unfolds_and_unescapes_text() {
        let text = "BEGIN:VEVENT\r\n\
SUMMARY:Office closed\\, \r\n  building works\\; sorry\r\n\
DESCRIPTION:line one\\nline two\r\n\
CATEGORIES:Holiday,Office\\, London\r\n\
DTSTART;VALUE=DATE:20201002\r\n\
END:VEVENT\r\n";
        let events = parse(text, London).unwrap();

        assert_eq!(events[0].summary, "Office closed,  building works; sorry");
        assert_eq!(events[0].description.as_deref(), Some("line one\nline two"));
        assert_eq!(events[0].categories, vec!["Holiday", "Office, London"]);
    }

    #[test]
    fn ignores_properties_of_nested_components() {
        let text = "BEGIN:VEVENT\n\
SUMMARY:meeting\n\
DTSTART:20201002T090000Z\n\
DTEND:20201002T100000Z\n\
BEGIN:VALARM\n\
SUMMARY:reminder\n\
TRIGGER:-PT15M\n\
END:VALARM\n\
END:VEVENT\n";
        let events = parse(text, London).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].summary, "meeting");
    }

    #[test]
    fn skips_events_without_start() {
        let text = "BEGIN:VEVENT\nSUMMARY:nothing\nEND:VEVENT\n";
        assert!(parse(text, London).unwrap().is_empty());
    }

    #[test]
    fn reports_bad_dates_with_line_numbers() {
        let text = "BEGIN:VCALENDAR\nBEGIN:VEVENT\nDTSTART:2020-10-02\nEND:VEVENT\n";
        assert_eq!(
            parse(text, London).unwrap_err(),
            IcsError::InvalidDateTime {
                line: 3,
                value: "2020-10-02".to_string()
            }
        );
    }

    #[test]
    fn reports_bad_durations() {
        for bad in ["P", "PT", "1H", "PXD"] {
            let text = format!("BEGIN:VEVENT\nDTSTART:20201002T090000Z\nDURATION:{bad}\nEND:VEVENT\n");
            assert!(
                matches!(parse(&text, London), Err(IcsError::InvalidDuration { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn out_of_range_durations_are_errors() {
        for (start, duration) in [
            ("DTSTART:20201002T090000Z", "P99999999999W"),
            ("DTSTART:20201002T090000Z", "PT99999999999999999H"),
            ("DTSTART:20201002T090000Z", "P99999999D"),
            ("DTSTART;VALUE=DATE:20201002", "P99999999D"),
        ] {
            let text = format!("BEGIN:VEVENT\n{start}\nDURATION:{duration}\nEND:VEVENT\n");
            assert_eq!(
                parse(&text, London).unwrap_err(),
                IcsError::InvalidDuration {
                    line: 3,
                    value: duration.to_string()
                },
                "{start} + {duration}"
            );
        }
    }

    #[test]
    fn reports_unterminated_events() {
        let text = "BEGIN:VCALENDAR\nBEGIN:VEVENT\nDTSTART:20201002T090000Z\n";
        assert_eq!(
            parse(text, London).unwrap_err(),
            IcsError::UnterminatedEvent { line: 2 }
        );
    }

    #[test]
    fn malformed_lines_outside_events_are_ignored() {
        let text = "garbage without separator\nBEGIN:VEVENT\nDTSTART:20201002T090000Z\nEND:VEVENT\n";
        assert_eq!(parse(text, London).unwrap().len(), 1);
    }
}
