//! Watch command: keeps calendars fresh and reports working time as it accrues.

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use tokio::time::MissedTickBehavior;
use wt_calendar::{CalendarService, CalendarSource, Loader, SharedCalculator};
use wt_core::Calculator;

use super::util::format_duration;

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
pub async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Prints working time from `since` to now every `every` until `stop`
/// resolves. Calendar sources are loaded first and refreshed in the
/// background; refresh failures are reported inline.
pub async fn run<W, F>(
    writer: &mut W,
    calculator: Calculator,
    sources: Vec<CalendarSource>,
    since: DateTime<Utc>,
    every: Duration,
    stop: F,
) -> Result<()>
where
    W: Write,
    F: Future<Output = ()>,
{
    anyhow::ensure!(!every.is_zero(), "watch interval must be positive");

    let shared = SharedCalculator::new(calculator);
    let loader = Loader::new().context("failed to create calendar loader")?;
    let (mut service, mut failures) = CalendarService::new(shared.clone(), loader);
    for source in sources {
        let id = source.id.clone();
        service
            .add_source(source)
            .await
            .with_context(|| format!("failed to load calendar {id}"))?;
    }

    let since_label = since.to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(stop);

    loop {
        tokio::select! {
            () = &mut stop => break,
            Some(failure) = failures.recv() => {
                writeln!(writer, "warning: {failure}")?;
            }
            _ = ticker.tick() => {
                let now = Utc::now();
                let duration = shared.read().working_duration_between(since, now);
                writeln!(
                    writer,
                    "{} working time since {since_label}: {}",
                    now.to_rfc3339_opts(SecondsFormat::Secs, true),
                    format_duration(duration.as_milliseconds())
                )?;
                writer.flush()?;
            }
        }
    }

    tracing::debug!("stopping watch");
    service.shutdown().await;
    Ok(())
}
