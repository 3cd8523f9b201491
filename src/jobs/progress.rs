use crate::sources::SourceError;
use crate::store::StoreError;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Running,
    Done,
    Error,
    Stopped,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Error | JobState::Stopped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Backfill,
    Reconcile,
    Rebuild,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobKind::Backfill => "backfill",
            JobKind::Reconcile => "reconcile",
            JobKind::Rebuild => "rebuild",
        })
    }
}

/// Snapshot of a job, published on every step.
///
/// Counters only ever reflect data that reached disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub kind: JobKind,
    pub state: JobState,
    pub message: String,
    pub months_processed: u64,
    pub days_scanned: u64,
    pub days_written: u64,
    pub candles_ingested: u64,
    pub gaps_found: u64,
    pub gaps_repaired: u64,
    pub gaps_skipped: u64,
    pub swings_written: u64,
    pub aggregates_written: u64,
    /// Month or day currently being worked on.
    pub current: Option<String>,
}

impl JobProgress {
    pub fn idle(kind: JobKind) -> Self {
        Self {
            kind,
            state: JobState::Idle,
            message: String::new(),
            months_processed: 0,
            days_scanned: 0,
            days_written: 0,
            candles_ingested: 0,
            gaps_found: 0,
            gaps_repaired: 0,
            gaps_skipped: 0,
            swings_written: 0,
            aggregates_written: 0,
            current: None,
        }
    }
}

/// Cooperative cancellation flag, polled by jobs between units of work.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Failures that end a job in the `error` state.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// How a job body ended when it did not fail.
pub(crate) enum Outcome {
    Done(String),
    Stopped,
}

/// Owns the progress snapshot of a running job and publishes it.
pub(crate) struct Tracker<'a> {
    tx: &'a watch::Sender<JobProgress>,
    pub progress: JobProgress,
}

impl<'a> Tracker<'a> {
    pub fn start(kind: JobKind, tx: &'a watch::Sender<JobProgress>) -> Self {
        let mut progress = JobProgress::idle(kind);
        progress.state = JobState::Running;
        let tracker = Self { tx, progress };
        tracker.publish();
        tracker
    }

    pub fn publish(&self) {
        self.tx.send_replace(self.progress.clone());
    }

    pub fn set_current(&mut self, current: impl Into<String>) {
        self.progress.current = Some(current.into());
        self.publish();
    }

    /// Publish the terminal snapshot and hand it back.
    pub fn finish(mut self, result: Result<Outcome, JobError>) -> JobProgress {
        let kind = self.progress.kind;
        match result {
            Ok(Outcome::Done(message)) => {
                self.progress.state = JobState::Done;
                self.progress.message = message;
                log::info!("✅ {} done: {}", kind, self.progress.message);
            }
            Ok(Outcome::Stopped) => {
                self.progress.state = JobState::Stopped;
                self.progress.message = "stopped by request".to_string();
                log::info!("⏹️  {} stopped", kind);
            }
            Err(e) => {
                self.progress.state = JobState::Error;
                self.progress.message = e.to_string();
                log::error!("❌ {} failed: {}", kind, e);
            }
        }
        self.progress.current = None;
        self.publish();
        self.progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_publishes_terminal_state() {
        let (tx, rx) = watch::channel(JobProgress::idle(JobKind::Rebuild));
        let mut tracker = Tracker::start(JobKind::Rebuild, &tx);
        assert_eq!(rx.borrow().state, JobState::Running);

        tracker.progress.days_written = 2;
        tracker.set_current("2021-01-01");
        assert_eq!(rx.borrow().current.as_deref(), Some("2021-01-01"));

        let err = JobError::Source(SourceError::Http {
            status: 503,
            url: "https://example.invalid".to_string(),
        });
        let last = tracker.finish(Err(err));
        assert_eq!(last.state, JobState::Error);
        assert!(last.message.contains("503"));
        assert_eq!(*rx.borrow(), last);
    }

    #[test]
    fn test_stop_signal_is_shared() {
        let stop = StopSignal::new();
        let clone = stop.clone();
        assert!(!clone.is_stopped());
        stop.stop();
        assert!(clone.is_stopped());
        assert!(JobState::Stopped.is_terminal());
        assert!(!JobState::Running.is_terminal());
    }
}
