use super::backfill::{run_backfill, BackfillOptions};
use super::progress::{JobKind, JobProgress, JobState, StopSignal};
use super::rebuild::{run_rebuild, RebuildOptions};
use super::reconcile::{run_reconcile, ReconcileOptions};
use crate::pipeline::PipelineConfig;
use crate::sources::{ArchiveSource, RangeSource};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("cannot start {requested}: {active} is already running")]
    Busy { requested: JobKind, active: JobKind },
}

struct ActiveJob {
    kind: JobKind,
    stop: StopSignal,
}

type Slot = Arc<Mutex<Option<ActiveJob>>>;

fn lock(slot: &Slot) -> MutexGuard<'_, Option<ActiveJob>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Frees the exclusive slot when the job task ends, however it ends.
struct SlotGuard {
    slot: Slot,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        lock(&self.slot).take();
    }
}

/// A running maintenance job.
pub struct JobHandle {
    kind: JobKind,
    progress: watch::Receiver<JobProgress>,
    stop: StopSignal,
    task: JoinHandle<JobProgress>,
}

impl JobHandle {
    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn progress(&self) -> watch::Receiver<JobProgress> {
        self.progress.clone()
    }

    pub fn latest(&self) -> JobProgress {
        self.progress.borrow().clone()
    }

    /// Request a cooperative stop; the job finishes its current unit first.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// A clone of the job's stop flag, for signal handlers.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Wait for the job and return its terminal snapshot.
    pub async fn join(self) -> JobProgress {
        match self.task.await {
            Ok(progress) => progress,
            Err(e) => {
                let mut progress = self.progress.borrow().clone();
                progress.state = JobState::Error;
                progress.message = format!("job task failed: {}", e);
                progress
            }
        }
    }
}

/// Owns the single "active exclusive job" slot shared by backfill,
/// reconciliation and rebuild. A start while another job runs fails fast.
pub struct JobOrchestrator {
    config: Arc<PipelineConfig>,
    archive: Arc<dyn ArchiveSource>,
    range: Arc<dyn RangeSource>,
    active: Slot,
}

impl JobOrchestrator {
    pub fn new(
        config: Arc<PipelineConfig>,
        archive: Arc<dyn ArchiveSource>,
        range: Arc<dyn RangeSource>,
    ) -> Self {
        Self {
            config,
            archive,
            range,
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn active_job(&self) -> Option<JobKind> {
        lock(&self.active).as_ref().map(|job| job.kind)
    }

    /// Ask the active job, if any, to stop.
    pub fn stop_active(&self) -> Option<JobKind> {
        let slot = lock(&self.active);
        slot.as_ref().map(|job| {
            job.stop.stop();
            job.kind
        })
    }

    fn claim(&self, requested: JobKind) -> Result<(StopSignal, SlotGuard), OrchestratorError> {
        let mut slot = lock(&self.active);
        if let Some(active) = slot.as_ref() {
            return Err(OrchestratorError::Busy {
                requested,
                active: active.kind,
            });
        }
        let stop = StopSignal::new();
        *slot = Some(ActiveJob {
            kind: requested,
            stop: stop.clone(),
        });
        log::info!("🔒 Claimed job slot for {}", requested);
        Ok((
            stop,
            SlotGuard {
                slot: self.active.clone(),
            },
        ))
    }

    pub fn start_backfill(&self, opts: BackfillOptions) -> Result<JobHandle, OrchestratorError> {
        let kind = JobKind::Backfill;
        let (stop, guard) = self.claim(kind)?;
        let (tx, rx) = watch::channel(JobProgress::idle(kind));
        let config = self.config.clone();
        let source = self.archive.clone();
        let job_stop = stop.clone();

        let task = tokio::spawn(async move {
            let _guard = guard;
            run_backfill(&config, source.as_ref(), opts, &job_stop, &tx).await
        });
        Ok(JobHandle {
            kind,
            progress: rx,
            stop,
            task,
        })
    }

    pub fn start_reconcile(&self, opts: ReconcileOptions) -> Result<JobHandle, OrchestratorError> {
        let kind = JobKind::Reconcile;
        let (stop, guard) = self.claim(kind)?;
        let (tx, rx) = watch::channel(JobProgress::idle(kind));
        let config = self.config.clone();
        let source = self.range.clone();
        let job_stop = stop.clone();

        let task = tokio::spawn(async move {
            let _guard = guard;
            run_reconcile(&config, source.as_ref(), opts, &job_stop, &tx).await
        });
        Ok(JobHandle {
            kind,
            progress: rx,
            stop,
            task,
        })
    }

    pub fn start_rebuild(&self, opts: RebuildOptions) -> Result<JobHandle, OrchestratorError> {
        let kind = JobKind::Rebuild;
        let (stop, guard) = self.claim(kind)?;
        let (tx, rx) = watch::channel(JobProgress::idle(kind));
        let config = self.config.clone();
        let job_stop = stop.clone();

        let task = tokio::spawn(async move {
            let _guard = guard;
            run_rebuild(&config, opts, &job_stop, &tx).await
        });
        Ok(JobHandle {
            kind,
            progress: rx,
            stop,
            task,
        })
    }
}
