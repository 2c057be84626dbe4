//! Calendar feeds as working-time exclusions.
//!
//! Reads iCalendar data from files or URLs, turns events into exclusions and
//! keeps them current in a [`SharedCalculator`]:
//! - `ics`: a small `VEVENT` reader
//! - `source`: where a calendar lives and which events count
//! - `loader`: fetching and conversion
//! - `service`: initial load plus background refresh

pub mod ics;
pub mod loader;
pub mod service;
pub mod source;

pub use ics::{CalendarEvent, IcsError};
pub use loader::{CalendarError, Loader, to_exclusions};
pub use service::{CalendarService, RefreshFailure, RefreshFailures, SharedCalculator};
pub use source::{CalendarSource, EventFilter, SourceLocation, SummaryFilter};
