//! Background refresh of calendar exclusions.
//!
//! A [`CalendarService`] loads each source once, installs it into a
//! [`SharedCalculator`], and keeps refreshing sources that ask for it. A
//! refresh swaps a source's whole exclusion set under the write lock, so a
//! concurrent query sees either the old set or the new one, never a mix.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use wt_core::{Calculator, Exclusion, ToInstant, WorkingDuration};

use crate::loader::{CalendarError, Loader};
use crate::source::CalendarSource;

/// A calculator shared between query callers and refresh tasks.
#[derive(Debug, Clone, Default)]
pub struct SharedCalculator(Arc<RwLock<Calculator>>);

impl SharedCalculator {
    pub fn new(calculator: Calculator) -> Self {
        Self(Arc::new(RwLock::new(calculator)))
    }

    // A panic while holding the lock cannot leave a registry half-written:
    // every mutation is a single insert or replace.
    pub fn read(&self) -> RwLockReadGuard<'_, Calculator> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Calculator> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn working_duration(
        &self,
        start: impl ToInstant,
        end: impl ToInstant,
    ) -> wt_core::Result<WorkingDuration> {
        self.read().working_duration(start, end)
    }

    pub fn install_calendar_exclusions(
        &self,
        source_id: &str,
        intervals: impl IntoIterator<Item = Exclusion>,
    ) -> usize {
        self.write().install_calendar_exclusions(source_id, intervals)
    }
}

/// A background reload that failed. The previous exclusions stay installed.
#[derive(Debug, Error)]
#[error("refresh of calendar {source_id} failed: {cause}")]
pub struct RefreshFailure {
    pub source_id: String,
    #[source]
    pub cause: CalendarError,
}

/// Receiving end for background refresh failures.
pub type RefreshFailures = mpsc::UnboundedReceiver<RefreshFailure>;

#[derive(Debug)]
struct SourceHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// Owns calendar sources and their refresh tasks.
///
/// Must be used from within a Tokio runtime. Dropping the service cancels
/// every refresh task.
#[derive(Debug)]
pub struct CalendarService {
    calculator: SharedCalculator,
    loader: Loader,
    failures: mpsc::UnboundedSender<RefreshFailure>,
    shutdown: CancellationToken,
    sources: HashMap<String, SourceHandle>,
}

impl CalendarService {
    pub fn new(calculator: SharedCalculator, loader: Loader) -> (Self, RefreshFailures) {
        let (failures, receiver) = mpsc::unbounded_channel();
        let service = Self {
            calculator,
            loader,
            failures,
            shutdown: CancellationToken::new(),
            sources: HashMap::new(),
        };
        (service, receiver)
    }

    pub const fn calculator(&self) -> &SharedCalculator {
        &self.calculator
    }

    pub fn source_ids(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn is_disposed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Loads `source`, installs its exclusions and starts refreshing it if it
    /// has a refresh interval. Returns the number of exclusions installed.
    ///
    /// # Errors
    ///
    /// Returns an error if the service is disposed, the id is already in use,
    /// or the initial load fails. Nothing is installed on error.
    pub async fn add_source(&mut self, source: CalendarSource) -> Result<usize, CalendarError> {
        if self.is_disposed() {
            return Err(CalendarError::Disposed);
        }
        if self.sources.contains_key(&source.id) {
            return Err(CalendarError::DuplicateSource(source.id));
        }

        let exclusions = self.loader.load(&source).await?;
        // Disposal may have happened while the load was in flight.
        if self.is_disposed() {
            return Err(CalendarError::Disposed);
        }
        let installed = self
            .calculator
            .install_calendar_exclusions(&source.id, exclusions);
        tracing::info!(source_id = %source.id, installed, "installed calendar");

        let cancel = self.shutdown.child_token();
        let task = source.refresh_interval().map(|every| {
            tokio::spawn(refresh_loop(
                source.clone(),
                every,
                self.loader.clone(),
                self.calculator.clone(),
                self.failures.clone(),
                cancel.clone(),
            ))
        });
        self.sources
            .insert(source.id, SourceHandle { cancel, task });
        Ok(installed)
    }

    /// Stops refreshing `source_id` and removes its exclusions.
    pub fn remove_source(&mut self, source_id: &str) -> bool {
        let Some(handle) = self.sources.remove(source_id) else {
            return false;
        };
        handle.cancel.cancel();
        self.calculator.write().remove_calendar_exclusions(source_id);
        tracing::info!(source_id, "removed calendar");
        true
    }

    /// Cancels every refresh task. Installed exclusions are kept and later
    /// [`add_source`](Self::add_source) calls fail with
    /// [`CalendarError::Disposed`].
    pub fn dispose(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::debug!(sources = self.sources.len(), "disposing calendar service");
            self.shutdown.cancel();
        }
    }

    /// Disposes the service and waits for refresh tasks to finish.
    pub async fn shutdown(mut self) {
        self.dispose();
        let tasks: Vec<_> = self
            .sources
            .values_mut()
            .filter_map(|handle| handle.task.take())
            .collect();
        for task in tasks {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "refresh task ended abnormally");
            }
        }
    }
}

impl Drop for CalendarService {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn refresh_loop(
    source: CalendarSource,
    every: Duration,
    loader: Loader,
    calculator: SharedCalculator,
    failures: mpsc::UnboundedSender<RefreshFailure>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::debug!(source_id = %source.id, every_ms = every.as_millis(), "refresh task started");

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = loader.load(&source) => result,
        };

        match result {
            Ok(exclusions) => {
                let installed = {
                    let mut calc = calculator.write();
                    // Checked under the lock so a removed source stays removed.
                    if cancel.is_cancelled() {
                        break;
                    }
                    calc.install_calendar_exclusions(&source.id, exclusions)
                };
                tracing::debug!(source_id = %source.id, installed, "refreshed calendar");
            }
            Err(cause) => {
                tracing::warn!(source_id = %source.id, error = %cause, "calendar refresh failed");
                let failure = RefreshFailure {
                    source_id: source.id.clone(),
                    cause,
                };
                if failures.send(failure).is_err() {
                    tracing::debug!(source_id = %source.id, "no listener for refresh failures");
                }
            }
        }
    }

    tracing::debug!(source_id = %source.id, "refresh task stopped");
}
