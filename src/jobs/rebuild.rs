//! Full derived-data rebuild from persisted base candles
//!
//! Replays every eligible base day through a fresh [`DerivationEngine`], the
//! same one the live path drives, and only writes once the replay finished.
//! A stop request during replay leaves the derived stores untouched.

use super::progress::{JobError, JobKind, JobProgress, Outcome, StopSignal, Tracker};
use super::reconcile::eligible_days;
use crate::market::{date_key, now_ms, Candle, Interval};
use crate::pipeline::{DerivationEngine, PipelineConfig};
use crate::series::SwingEvent;
use std::collections::BTreeMap;
use tokio::sync::watch;

#[derive(Debug, Clone, Default)]
pub struct RebuildOptions {
    /// Only replay the most recent N eligible days.
    pub max_days: Option<usize>,
    /// Clock override, milliseconds since epoch.
    pub now_ms: Option<i64>,
}

pub async fn run_rebuild(
    config: &PipelineConfig,
    opts: RebuildOptions,
    stop: &StopSignal,
    tx: &watch::Sender<JobProgress>,
) -> JobProgress {
    let mut tracker = Tracker::start(JobKind::Rebuild, tx);
    let result = rebuild(config, &opts, stop, &mut tracker).await;
    tracker.finish(result)
}

async fn rebuild(
    config: &PipelineConfig,
    opts: &RebuildOptions,
    stop: &StopSignal,
    tracker: &mut Tracker<'_>,
) -> Result<Outcome, JobError> {
    let layout = config.layout();
    let stream = config.base_stream();
    let now = opts.now_ms.unwrap_or_else(now_ms);
    let days = eligible_days(layout.candle_days(&stream)?, now, None, opts.max_days);

    log::info!("🔁 Starting derived rebuild for {} {}", stream.symbol, stream.interval);
    log::info!("   ├─ Base days: {}", days.len());
    log::info!("   ├─ Derived intervals: {:?}", config.derived_intervals);
    log::info!("   └─ Pivot length: {}", config.pivot_len);

    let mut engine = DerivationEngine::from_config(config);
    let mut aggregates: BTreeMap<(Interval, String), Vec<Candle>> = BTreeMap::new();
    let mut swings: BTreeMap<(Interval, String), Vec<SwingEvent>> = BTreeMap::new();

    for day in &days {
        if stop.is_stopped() {
            return Ok(Outcome::Stopped);
        }
        tracker.set_current(day.clone());

        for candle in layout.read_candles(&stream, day)? {
            if stop.is_stopped() {
                return Ok(Outcome::Stopped);
            }
            let derived = engine.process(&candle);
            for agg in derived.aggregates {
                aggregates
                    .entry((agg.interval, date_key(agg.open_time)))
                    .or_default()
                    .push(agg);
            }
            for swing in derived.swings {
                swings
                    .entry((swing.interval, date_key(swing.open_time)))
                    .or_default()
                    .push(swing);
            }
        }
        tracker.progress.days_scanned += 1;
        // let the runtime breathe between days
        tokio::task::yield_now().await;
    }

    log::info!(
        "📝 Replay complete: {} aggregate partitions, {} swing partitions",
        aggregates.len(),
        swings.len()
    );

    for ((interval, day), candles) in aggregates {
        let count = candles.len() as u64;
        layout.upsert_candles(&stream.with_interval(interval), &day, candles)?;
        tracker.progress.aggregates_written += count;
        tracker.progress.days_written += 1;
    }
    tracker.publish();

    for ((interval, day), events) in swings {
        let count = events.len() as u64;
        layout.upsert_swings(&stream.with_interval(interval), config.pivot_len, &day, events)?;
        tracker.progress.swings_written += count;
        tracker.progress.days_written += 1;
    }

    let p = &tracker.progress;
    Ok(Outcome::Done(format!(
        "{} days replayed, {} aggregates, {} swings",
        p.days_scanned, p.aggregates_written, p.swings_written
    )))
}
