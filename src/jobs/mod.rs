//! Maintenance jobs over the candle store
//!
//! ## Jobs
//!
//! - **backfill**: walks monthly archives backward from the oldest stored day
//! - **reconcile**: scans stored days for gaps and repairs the small ones
//! - **rebuild**: replays base candles to regenerate aggregates and swings
//!
//! The three are mutually exclusive through [`JobOrchestrator`]. Each runs as
//! `idle → running → {done | error | stopped}` and publishes [`JobProgress`]
//! on a `tokio::sync::watch` channel. Runners never return an error: failures
//! become the `error` state with a readable message.

pub mod backfill;
pub mod orchestrator;
pub mod progress;
pub mod rebuild;
pub mod reconcile;

pub use backfill::{run_backfill, BackfillOptions};
pub use orchestrator::{JobHandle, JobOrchestrator, OrchestratorError};
pub use progress::{JobError, JobKind, JobProgress, JobState, StopSignal};
pub use rebuild::{run_rebuild, RebuildOptions};
pub use reconcile::{run_reconcile, ReconcileOptions};
