//! Historical backfill from monthly archives, newest to oldest
//!
//! ```text
//! resume month ──fetch──▶ 404? ──▶ miss streak ──▶ 3 (had data) / 12 (never) ──▶ done
//!                 │
//!                 └─ zip ──▶ CSV rows ──group by day──▶ upsert_merge(open_time)
//! ```

use super::progress::{JobError, JobKind, JobProgress, Outcome, StopSignal, Tracker};
use crate::market::{date_key, now_ms, Candle, YearMonth};
use crate::pipeline::PipelineConfig;
use crate::sources::{parse_archive_line, ArchiveSource, MonthArchive};
use std::collections::BTreeMap;
use tokio::sync::watch;

/// Oldest year any exchange archive can hold.
pub const FLOOR_YEAR: i32 = 2017;
/// Consecutive missing months that end a backfill once data was found.
pub const MISSES_AFTER_DATA: u32 = 3;
/// Consecutive missing months that end a backfill that never found data.
pub const MISSES_WITHOUT_DATA: u32 = 12;
const MAX_ITERATIONS: u64 = 600;

#[derive(Debug, Clone, Default)]
pub struct BackfillOptions {
    /// Stop after this many months were attempted.
    pub max_months: Option<u64>,
    /// Clock override, milliseconds since epoch.
    pub now_ms: Option<i64>,
}

/// Month to start walking backward from.
///
/// One month before the earliest stored candle, else the month before `now`.
pub fn resume_month(earliest: Option<i64>, now: i64) -> YearMonth {
    let latest_allowed = YearMonth::containing(now).prev();
    let floor = YearMonth::new(FLOOR_YEAR, 1);
    match earliest {
        Some(ts) => YearMonth::containing(ts).prev().max(floor).min(latest_allowed),
        None => latest_allowed,
    }
}

pub async fn run_backfill(
    config: &PipelineConfig,
    source: &dyn ArchiveSource,
    opts: BackfillOptions,
    stop: &StopSignal,
    tx: &watch::Sender<JobProgress>,
) -> JobProgress {
    let mut tracker = Tracker::start(JobKind::Backfill, tx);
    let result = backfill(config, source, &opts, stop, &mut tracker).await;
    tracker.finish(result)
}

async fn backfill(
    config: &PipelineConfig,
    source: &dyn ArchiveSource,
    opts: &BackfillOptions,
    stop: &StopSignal,
    tracker: &mut Tracker<'_>,
) -> Result<Outcome, JobError> {
    let layout = config.layout();
    let stream = config.base_stream();
    let now = opts.now_ms.unwrap_or_else(now_ms);

    let earliest = layout.earliest_open_time(&stream)?;
    let mut month = resume_month(earliest, now);
    let mut found_any = earliest.is_some();
    let mut misses = 0u32;

    log::info!("🚀 Starting backfill for {} {}", stream.symbol, stream.interval);
    log::info!("   ├─ Resume month: {}", month.label());
    log::info!("   ├─ Local data: {}", if found_any { "yes" } else { "none" });
    log::info!("   └─ Max months: {:?}", opts.max_months);

    for _ in 0..MAX_ITERATIONS {
        if opts
            .max_months
            .map_or(false, |max| tracker.progress.months_processed >= max)
        {
            return Ok(Outcome::Done(format!(
                "month limit reached ({} months)",
                tracker.progress.months_processed
            )));
        }
        if stop.is_stopped() {
            return Ok(Outcome::Stopped);
        }
        tracker.set_current(month.label());

        let archive = source.fetch_month(&stream, month).await?;
        tracker.progress.months_processed += 1;

        let files = match archive {
            MonthArchive::NotFound => {
                misses += 1;
                log::debug!("📭 No archive for {} ({} consecutive)", month.label(), misses);
                if found_any && misses >= MISSES_AFTER_DATA {
                    return Ok(Outcome::Done(format!(
                        "reached start of history after {} months",
                        tracker.progress.months_processed
                    )));
                }
                if !found_any && misses >= MISSES_WITHOUT_DATA {
                    return Ok(Outcome::Done("no historical data found".to_string()));
                }
                month = month.prev();
                tracker.publish();
                continue;
            }
            MonthArchive::Found(files) => files,
        };
        misses = 0;
        found_any = true;

        let mut by_day: BTreeMap<String, Vec<Candle>> = BTreeMap::new();
        for file in &files {
            for line in file.body.lines() {
                if stop.is_stopped() {
                    return Ok(Outcome::Stopped);
                }
                if let Some(candle) = parse_archive_line(line, &stream) {
                    by_day.entry(date_key(candle.open_time)).or_default().push(candle);
                }
            }
        }

        let mut month_candles = 0u64;
        for (day, candles) in by_day {
            let count = layout.upsert_candles(&stream, &day, candles)?.inserted as u64;
            tracker.progress.days_written += 1;
            tracker.progress.candles_ingested += count;
            month_candles += count;
        }
        log::info!("📦 {} → {} candles", month.label(), month_candles);

        month = month.prev();
        tracker.publish();
    }

    Ok(Outcome::Done("iteration limit reached".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAR_2021: i64 = 1_614_556_800_000; // 2021-03-01

    #[test]
    fn test_resume_month() {
        // no local data: month before now
        assert_eq!(resume_month(None, MAR_2021), YearMonth::new(2021, 2));
        // month before the earliest record
        assert_eq!(resume_month(Some(MAR_2021 - 1), MAR_2021 + 40 * 86_400_000), YearMonth::new(2021, 1));
        // clamped to the floor
        assert_eq!(resume_month(Some(0), MAR_2021), YearMonth::new(FLOOR_YEAR, 1));
    }
}
