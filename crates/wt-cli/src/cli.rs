//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use wt_core::Unit;

/// Working-time calculator.
///
/// Counts the time between two instants that falls inside configured working
/// hours and outside holidays, blackout periods and calendar events.
#[derive(Debug, Parser)]
#[command(name = "wt", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Working time between two instants.
    ///
    /// Instants are ISO 8601 with an offset (2020-08-31T09:00:00+01:00),
    /// `now`, or relative (`3 days ago`). Order does not matter.
    Duration {
        /// Start of the interval.
        start: String,

        /// End of the interval.
        end: String,

        /// Unit to report in (hours, minutes, seconds, milliseconds).
        #[arg(short, long, default_value_t = Unit::Hours)]
        unit: Unit,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List configured working windows.
    Schedule {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List custom and calendar exclusions.
    Exclusions {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Keep calendars fresh and print working time since START until Ctrl-C.
    Watch {
        /// Start of the measured interval.
        #[arg(long)]
        since: String,

        /// Seconds between updates.
        #[arg(long, default_value_t = 60)]
        interval: u64,
    },
}
