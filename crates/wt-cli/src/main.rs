use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wt_cli::commands::{duration, exclusions, schedule, util, watch};
use wt_cli::{Cli, Commands, Config};

fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logging is best effort; a subscriber that fails to install is not fatal.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let mut stdout = std::io::stdout().lock();

    match &cli.command {
        Some(Commands::Duration {
            start,
            end,
            unit,
            json,
        }) => {
            let config = load_config(cli.config.as_deref())?;
            let now = Utc::now();
            let start = util::parse_datetime(start, now)?;
            let end = util::parse_datetime(end, now)?;
            let calculator = util::load_calculator(&config)?;
            duration::run(&mut stdout, &calculator, start, end, *unit, *json)?;
        }
        Some(Commands::Schedule { json }) => {
            let config = load_config(cli.config.as_deref())?;
            let calculator = config.build_calculator()?;
            schedule::run(&mut stdout, calculator.working_hours(), *json)?;
        }
        Some(Commands::Exclusions { json }) => {
            let config = load_config(cli.config.as_deref())?;
            let calculator = util::load_calculator(&config)?;
            exclusions::run(&mut stdout, calculator.exclusions(), *json)?;
        }
        Some(Commands::Watch { since, interval }) => {
            let config = load_config(cli.config.as_deref())?;
            let since = util::parse_datetime(since, Utc::now())?;
            let calculator = config.build_calculator()?;
            let sources = config.calendar_sources()?;
            let runtime =
                tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
            runtime.block_on(watch::run(
                &mut stdout,
                calculator,
                sources,
                since,
                Duration::from_secs(*interval),
                watch::shutdown_signal(),
            ))?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            writeln!(stdout)?;
        }
    }

    Ok(())
}
