//! Working-time accounting engine.
//!
//! This crate computes how much "working time" elapses between two instants:
//! - Schedule: recurring weekly working windows per weekday and timezone
//! - Exclusions: holidays and blackout periods, manual or from calendars
//! - Sweep: a single pass over typed markers that counts time inside any
//!   working window and outside every exclusion

mod calculator;
mod error;
pub mod exclusion;
pub mod marker;
pub mod schedule;
pub mod sweep;
pub mod time;

pub use calculator::{Calculator, Unit, WorkingDuration};
pub use error::{CalcError, Result};
pub use exclusion::{Exclusion, ExclusionSource, Exclusions};
pub use schedule::{WorkingHours, WorkingWindow};
pub use time::{
    TimeOfDay, ToInstant, parse_instant, parse_timezone, resolve_local, weekday_from_iso,
};
