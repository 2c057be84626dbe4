//! Fetching and converting calendar data.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use wt_core::{Exclusion, ExclusionSource};

use crate::ics::{self, CalendarEvent, IcsError};
use crate::source::{CalendarSource, SourceLocation};

/// Default request timeout for calendar downloads.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Calendar loading and service errors.
#[derive(Debug, Error)]
pub enum CalendarError {
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Server answered with a non-success status.
    #[error("{url} returned status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse calendar {source_id}: {source}")]
    Parse {
        source_id: String,
        #[source]
        source: IcsError,
    },
    #[error("calendar source {0} is already registered")]
    DuplicateSource(String),
    #[error("calendar service has been disposed")]
    Disposed,
}

/// Reads calendar sources from disk or over HTTP.
///
/// Clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct Loader {
    http: reqwest::Client,
}

impl Loader {
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new() -> Result<Self, CalendarError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn with_timeout(timeout: Duration) -> Result<Self, CalendarError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(CalendarError::ClientBuild)?;
        Ok(Self { http })
    }

    /// Returns the raw calendar text at `location`.
    pub async fn fetch(&self, location: &SourceLocation) -> Result<String, CalendarError> {
        match location {
            SourceLocation::File(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| CalendarError::Io {
                        path: path.clone(),
                        source,
                    })
            }
            SourceLocation::Url(url) => {
                let response = self.http.get(url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(CalendarError::Status {
                        url: url.clone(),
                        status,
                    });
                }
                Ok(response.text().await?)
            }
        }
    }

    /// Fetches and parses `source`, keeping events its filter accepts.
    pub async fn load_events(
        &self,
        source: &CalendarSource,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let text = self.fetch(&source.location).await?;
        let events = ics::parse(&text, source.timezone).map_err(|err| CalendarError::Parse {
            source_id: source.id.clone(),
            source: err,
        })?;
        let total = events.len();
        let kept: Vec<_> = events.into_iter().filter(|e| source.accepts(e)).collect();
        tracing::debug!(
            source_id = %source.id,
            location = %source.location,
            total,
            kept = kept.len(),
            "loaded calendar"
        );
        Ok(kept)
    }

    /// Loads `source` as exclusions ready to install.
    pub async fn load(&self, source: &CalendarSource) -> Result<Vec<Exclusion>, CalendarError> {
        let events = self.load_events(source).await?;
        Ok(to_exclusions(&source.id, events))
    }
}

/// Converts events to exclusions labelled by summary.
///
/// Events that do not end after they start cover no time and are dropped.
pub fn to_exclusions(
    source_id: &str,
    events: impl IntoIterator<Item = CalendarEvent>,
) -> Vec<Exclusion> {
    events
        .into_iter()
        .filter_map(|event| {
            let origin = ExclusionSource::Calendar {
                source_id: source_id.to_string(),
            };
            match Exclusion::new(event.start, event.end, event.summary, origin) {
                Ok(exclusion) => Some(exclusion),
                Err(err) => {
                    tracing::debug!(source_id, uid = ?event.uid, error = %err, "dropping empty event");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use chrono_tz::Europe::London;
    use std::io::Write as _;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HOLIDAYS: &str = "BEGIN:VCALENDAR\n\
BEGIN:VEVENT\n\
SUMMARY:Summer bank holiday\n\
DTSTART;VALUE=DATE:20200831\n\
END:VEVENT\n\
BEGIN:VEVENT\n\
SUMMARY:Team offsite (tentative)\n\
DTSTART:20200901T090000Z\n\
DTEND:20200901T170000Z\n\
END:VEVENT\n\
BEGIN:VEVENT\n\
SUMMARY:Zero length\n\
DTSTART:20200902T090000Z\n\
END:VEVENT\n\
END:VCALENDAR\n";

    fn write_calendar(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn loads_file_sources_and_drops_empty_events() {
        let file = write_calendar(HOLIDAYS);
        let source = CalendarSource::file("bank", file.path()).with_timezone(London);

        let exclusions = Loader::new().unwrap().load(&source).await.unwrap();

        assert_eq!(exclusions.len(), 2);
        assert_eq!(exclusions[0].label, "Summer bank holiday");
        assert_eq!(exclusions[0].start, Utc.with_ymd_and_hms(2020, 8, 30, 23, 0, 0).unwrap());
        assert_eq!(
            exclusions[0].source,
            ExclusionSource::Calendar {
                source_id: "bank".to_string()
            }
        );
    }

    #[tokio::test]
    async fn applies_source_filter() {
        let file = write_calendar(HOLIDAYS);
        let source = CalendarSource::file("bank", file.path())
            .with_filter(|event| !event.summary.contains("tentative"));

        let exclusions = Loader::new().unwrap().load(&source).await.unwrap();

        let labels: Vec<_> = exclusions.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["Summer bank holiday"]);
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = CalendarSource::file("gone", dir.path().join("missing.ics"));

        let err = Loader::new().unwrap().load(&source).await.unwrap_err();
        assert!(matches!(err, CalendarError::Io { .. }));
        assert!(err.to_string().contains("missing.ics"));
    }

    #[tokio::test]
    async fn invalid_calendar_is_a_parse_error() {
        let file = write_calendar("BEGIN:VEVENT\nDTSTART:yesterday\nEND:VEVENT\n");
        let source = CalendarSource::file("broken", file.path());

        let err = Loader::new().unwrap().load(&source).await.unwrap_err();
        assert!(matches!(
            err,
            CalendarError::Parse { ref source_id, .. } if source_id == "broken"
        ));
    }

    #[tokio::test]
    async fn loads_url_sources() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/holidays.ics"))
            .respond_with(ResponseTemplate::new(200).set_body_string(HOLIDAYS))
            .mount(&server)
            .await;

        let source = CalendarSource::url("remote", format!("{}/holidays.ics", server.uri()));
        let exclusions = Loader::new().unwrap().load(&source).await.unwrap();

        assert_eq!(exclusions.len(), 2);
    }

    #[tokio::test]
    async fn http_errors_are_reported_with_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let source = CalendarSource::url("remote", format!("{}/missing.ics", server.uri()));
        let err = Loader::new().unwrap().load(&source).await.unwrap_err();

        assert!(matches!(
            err,
            CalendarError::Status { status, .. } if status == reqwest::StatusCode::NOT_FOUND
        ));
    }

    #[test]
    fn to_exclusions_keeps_events_in_order() {
        let start = Utc.with_ymd_and_hms(2020, 9, 1, 9, 0, 0).unwrap();
        let event = |summary: &str, hours: i64| CalendarEvent {
            uid: None,
            summary: summary.to_string(),
            description: None,
            categories: Vec::new(),
            start,
            end: start + chrono::Duration::hours(hours),
            all_day: false,
        };

        let exclusions = to_exclusions("cal", [event("a", 1), event("b", 0), event("c", -1), event("d", 2)]);
        let labels: Vec<_> = exclusions.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["a", "d"]);
    }
}
