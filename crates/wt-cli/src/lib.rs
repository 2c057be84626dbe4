//! Working-time calculator CLI library.
//!
//! This crate provides the CLI interface for the working-time calculator.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands};
pub use config::{CalendarConfig, Config, ExclusionConfig, WeekdaySpec, WorkingHoursConfig};
