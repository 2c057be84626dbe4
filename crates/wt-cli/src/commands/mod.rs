//! CLI subcommand implementations.

pub mod duration;
pub mod exclusions;
pub mod schedule;
pub mod util;
pub mod watch;
