//! Gap reconciliation over the persisted base-candle days
//!
//! Every gap is logged. Gaps within the repair limit are fetched through the
//! range source, upserted and verified against disk; anything else is
//! counted as skipped and the scan moves on.

use super::progress::{JobError, JobKind, JobProgress, Outcome, StopSignal, Tracker};
use crate::market::{date_key, detect_gaps, now_ms, Candle, GapRecord, StreamKey};
use crate::pipeline::PipelineConfig;
use crate::sources::{RangeSource, RANGE_LIMIT};
use crate::store::StoreLayout;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::watch;

#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    /// Only scan the most recent N eligible days.
    pub max_days: Option<usize>,
    /// Open time of the newest live candle; its day is skipped.
    pub live_head: Option<i64>,
    /// Clock override, milliseconds since epoch.
    pub now_ms: Option<i64>,
}

pub async fn run_reconcile(
    config: &PipelineConfig,
    source: &dyn RangeSource,
    opts: ReconcileOptions,
    stop: &StopSignal,
    tx: &watch::Sender<JobProgress>,
) -> JobProgress {
    let mut tracker = Tracker::start(JobKind::Reconcile, tx);
    let result = reconcile(config, source, &opts, stop, &mut tracker).await;
    tracker.finish(result)
}

/// Days eligible for maintenance: everything except today and the live head day.
pub(crate) fn eligible_days(
    days: Vec<String>,
    now: i64,
    live_head: Option<i64>,
    max_days: Option<usize>,
) -> Vec<String> {
    let today = date_key(now);
    let head = live_head.map(date_key);
    let mut days: Vec<String> = days
        .into_iter()
        .filter(|d| *d != today && Some(d) != head.as_ref())
        .collect();
    if let Some(max) = max_days {
        let excess = days.len().saturating_sub(max);
        days.drain(..excess);
    }
    days
}

async fn reconcile(
    config: &PipelineConfig,
    source: &dyn RangeSource,
    opts: &ReconcileOptions,
    stop: &StopSignal,
    tracker: &mut Tracker<'_>,
) -> Result<Outcome, JobError> {
    let layout = config.layout();
    let stream = config.base_stream();
    let step = stream.interval.duration_ms();
    let now = opts.now_ms.unwrap_or_else(now_ms);

    let all_days = layout.candle_days(&stream)?;
    let days = eligible_days(all_days.clone(), now, opts.live_head, opts.max_days);

    log::info!("🔍 Starting gap reconciliation for {} {}", stream.symbol, stream.interval);
    log::info!("   ├─ Days to scan: {}", days.len());
    log::info!("   └─ Max repair: {} candles", config.max_gap_repair);

    // carry the last open time of the day preceding the scan window
    let mut prev = match days.first().and_then(|first| all_days.iter().rposition(|d| d < first)) {
        Some(i) => layout.read_candles(&stream, &all_days[i])?.last().map(|c| c.open_time),
        None => None,
    };

    let mut gap_log = layout.gap_store(&stream);

    for day in &days {
        if stop.is_stopped() {
            gap_log.close()?;
            return Ok(Outcome::Stopped);
        }
        tracker.set_current(day.clone());

        let open_times: Vec<i64> = layout
            .read_candles(&stream, day)?
            .iter()
            .map(|c| c.open_time)
            .collect();
        let gaps = detect_gaps(&open_times, step, prev);
        if let Some(last) = open_times.last() {
            prev = Some(*last);
        }
        tracker.progress.days_scanned += 1;

        for gap in gaps {
            tracker.progress.gaps_found += 1;
            gap_log.write(&gap, gap.expected_open_time)?;

            if gap.missing_candles > config.max_gap_repair {
                log::warn!(
                    "⚠️  Gap of {} candles at {} exceeds repair limit, skipping",
                    gap.missing_candles,
                    gap.expected_open_time
                );
                tracker.progress.gaps_skipped += 1;
                continue;
            }
            if stop.is_stopped() {
                gap_log.close()?;
                return Ok(Outcome::Stopped);
            }

            match repair_gap(&layout, &stream, source, &gap).await? {
                Repair::Verified(inserted) => {
                    tracker.progress.gaps_repaired += 1;
                    tracker.progress.candles_ingested += inserted.candles;
                    tracker.progress.days_written += inserted.days;
                }
                Repair::Unverified(inserted) => {
                    tracker.progress.gaps_skipped += 1;
                    tracker.progress.candles_ingested += inserted.candles;
                    tracker.progress.days_written += inserted.days;
                }
            }
            tracker.publish();
        }
    }
    gap_log.close()?;

    let p = &tracker.progress;
    Ok(Outcome::Done(format!(
        "{} days scanned, {} gaps found, {} repaired, {} skipped",
        p.days_scanned, p.gaps_found, p.gaps_repaired, p.gaps_skipped
    )))
}

#[derive(Debug, Default, Clone, Copy)]
struct Written {
    candles: u64,
    days: u64,
}

enum Repair {
    Verified(Written),
    Unverified(Written),
}

/// Fetch and upsert the missing candles of `gap`, then check that every
/// missing open time is now on disk.
///
/// A failed fetch is not fatal: the gap is left unverified.
async fn repair_gap(
    layout: &StoreLayout,
    stream: &StreamKey,
    source: &dyn RangeSource,
    gap: &GapRecord,
) -> Result<Repair, JobError> {
    let step = stream.interval.duration_ms();
    let start = gap.expected_open_time;
    let end = gap.actual_open_time - step;

    let fetched = match source.fetch_range(stream, start, end).await {
        Ok(candles) => candles,
        Err(e) => {
            log::warn!("⚠️  Repair fetch {}..{} failed: {}", start, end, e);
            return Ok(Repair::Unverified(Written::default()));
        }
    };

    let mut by_day: BTreeMap<String, Vec<Candle>> = BTreeMap::new();
    for candle in fetched.into_iter().take(RANGE_LIMIT) {
        if stream.owns(&candle)
            && candle.open_time >= start
            && candle.open_time <= end
            && candle.open_time % step == 0
        {
            by_day.entry(date_key(candle.open_time)).or_default().push(candle);
        }
    }

    let mut written = Written::default();
    let mut on_disk: HashSet<i64> = HashSet::new();
    for (day, candles) in by_day {
        let stats = layout.upsert_candles(stream, &day, candles)?;
        written.candles += stats.inserted as u64;
        written.days += 1;
        on_disk.extend(layout.read_candles(stream, &day)?.iter().map(|c| c.open_time));
    }

    let complete = gap.missing_open_times(step).all(|t| on_disk.contains(&t));
    if complete {
        log::info!(
            "🩹 Repaired gap {} ({} candles)",
            gap.key(),
            gap.missing_candles
        );
        Ok(Repair::Verified(written))
    } else {
        log::warn!("⚠️  Gap {} only partially repaired", gap.key());
        Ok(Repair::Unverified(written))
    }
}
