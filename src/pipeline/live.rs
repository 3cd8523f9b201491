//! Live ingestion: one final candle at a time
//!
//! ```text
//! handle_candle(c)
//!   ├─ c.open_time <= last seen ──▶ ignored
//!   ├─ gap since last seen ──▶ gap log + LiveEvent::Gap
//!   │     └─ small enough ──▶ fetch_range ──▶ repair queue
//!   └─ repair queue + c, in order:
//!         persist base ──▶ DerivationEngine ──▶ persist aggregates + swings ──▶ events
//! ```
//!
//! Everything for one candle, including its repair candles, is handled before
//! the next call is accepted.

use super::config::PipelineConfig;
use super::derive::DerivationEngine;
use crate::market::{Candle, GapRecord, Interval, StreamKey};
use crate::series::{IndicatorPoint, SwingEvent};
use crate::sources::{RangeSource, SourceError, RANGE_LIMIT};
use crate::store::{PartitionedLogStore, StoreError, StoreLayout};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Upper bound on queued repair candles.
pub const REPAIR_QUEUE_CAP: usize = RANGE_LIMIT;

#[derive(Debug, Error)]
pub enum LiveError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Outbound notifications, tagged by stream through their payloads.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum LiveEvent {
    Base(IndicatorPoint),
    Derived(Candle),
    Swing(SwingEvent),
    Gap(GapRecord),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveStats {
    pub processed: u64,
    pub ignored: u64,
    pub gaps: u64,
    pub repaired: u64,
    pub aggregates: u64,
    pub swings: u64,
}

pub struct LiveIngestor {
    stream: StreamKey,
    layout: StoreLayout,
    max_gap_repair: i64,
    engine: DerivationEngine,
    candles: PartitionedLogStore<Candle>,
    aggregates: BTreeMap<Interval, PartitionedLogStore<Candle>>,
    swings: BTreeMap<Interval, PartitionedLogStore<SwingEvent>>,
    gaps: PartitionedLogStore<GapRecord>,
    repair: Option<Arc<dyn RangeSource>>,
    events: Option<mpsc::Sender<LiveEvent>>,
    queue: VecDeque<Candle>,
    last_open_time: Option<i64>,
    stats: LiveStats,
}

impl LiveIngestor {
    pub fn new(config: &PipelineConfig) -> Self {
        let layout = config.layout();
        let stream = config.base_stream();

        let aggregates = config
            .derived_intervals
            .iter()
            .map(|iv| (*iv, layout.candle_store(&stream.with_interval(*iv))))
            .collect();
        let swings = std::iter::once(config.base_interval)
            .chain(config.derived_intervals.iter().copied())
            .map(|iv| (iv, layout.swing_store(&stream.with_interval(iv), config.pivot_len)))
            .collect();

        Self {
            candles: layout.candle_store(&stream),
            gaps: layout.gap_store(&stream),
            aggregates,
            swings,
            engine: DerivationEngine::from_config(config),
            max_gap_repair: config.max_gap_repair.min(REPAIR_QUEUE_CAP as i64),
            stream,
            layout,
            repair: None,
            events: None,
            queue: VecDeque::new(),
            last_open_time: None,
            stats: LiveStats::default(),
        }
    }

    /// Fetch missing candles from `source` when a small gap is seen.
    pub fn with_repair_source(mut self, source: Arc<dyn RangeSource>) -> Self {
        self.repair = Some(source);
        self
    }

    pub fn with_events(mut self, tx: mpsc::Sender<LiveEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn stream(&self) -> &StreamKey {
        &self.stream
    }

    pub fn last_open_time(&self) -> Option<i64> {
        self.last_open_time
    }

    pub fn stats(&self) -> LiveStats {
        self.stats
    }

    pub fn engine(&self) -> &DerivationEngine {
        &self.engine
    }

    /// Restore derivation state from the newest stored base candles without
    /// writing anything.
    ///
    /// At least `max_candles` are replayed, extended back far enough to cover
    /// the in-progress bucket of the largest derived interval. When history is
    /// cut short, the replay starts on a bucket boundary of that interval so no
    /// aggregator resumes with a partial bucket. The last seen open time is
    /// always the newest stored candle. Returns the number of candles replayed.
    pub fn prime_from_store(&mut self, max_candles: usize) -> Result<usize, LiveError> {
        if max_candles == 0 {
            return Ok(0);
        }

        let widest = self
            .aggregates
            .keys()
            .copied()
            .max_by_key(|iv| iv.duration_ms())
            .unwrap_or(self.stream.interval);

        let mut newest_first: Vec<Candle> = Vec::new();
        for day in self.layout.candle_days(&self.stream)?.iter().rev() {
            let mut day_candles = self.layout.read_candles(&self.stream, day)?;
            day_candles.reverse();
            newest_first.extend(day_candles);
            if let (Some(newest), Some(oldest)) = (newest_first.first(), newest_first.last()) {
                let floor = widest.bucket_start(newest.open_time);
                if newest_first.len() >= max_candles && oldest.open_time <= floor {
                    break;
                }
            }
        }
        let newest = match newest_first.first() {
            Some(c) => c.open_time,
            None => return Ok(0),
        };

        let floor = widest.bucket_start(newest);
        let mut keep = max_candles.min(newest_first.len());
        while keep < newest_first.len() && newest_first[keep - 1].open_time > floor {
            keep += 1;
        }
        newest_first.truncate(keep);
        newest_first.reverse();
        let mut candles = newest_first;

        if let Some(last) = self.last_open_time {
            candles.retain(|c| c.open_time > last);
        }

        let earliest = self.layout.earliest_open_time(&self.stream)?;
        if let Some(first) = candles.first() {
            let bucket = widest.bucket_start(first.open_time);
            if bucket != first.open_time && earliest != Some(first.open_time) {
                let partial = candles
                    .iter()
                    .take_while(|c| widest.bucket_start(c.open_time) == bucket)
                    .count();
                candles.drain(..partial);
            }
        }

        for candle in &candles {
            self.engine.process(candle);
        }
        self.last_open_time = Some(self.last_open_time.map_or(newest, |last| last.max(newest)));

        log::info!("🔥 Primed live state from store");
        log::info!("   ├─ Candles replayed: {}", candles.len());
        log::info!("   ├─ Aligned to: {}", widest);
        log::info!("   └─ Last open time: {:?}", self.last_open_time);
        Ok(candles.len())
    }

    /// Ingest one final candle. Returns how many candles were processed,
    /// counting repair candles.
    pub async fn handle_candle(&mut self, candle: Candle) -> Result<usize, LiveError> {
        if !self.stream.owns(&candle) {
            log::warn!(
                "⚠️  Ignoring candle for {}:{}:{} on {}:{}:{} pipeline",
                candle.exchange,
                candle.symbol,
                candle.interval,
                self.stream.exchange,
                self.stream.symbol,
                self.stream.interval
            );
            self.stats.ignored += 1;
            return Ok(0);
        }
        if self.last_open_time.map_or(false, |last| candle.open_time <= last) {
            self.stats.ignored += 1;
            return Ok(0);
        }

        if let Some(last) = self.last_open_time {
            let step = self.stream.interval.duration_ms();
            if let Some(gap) = GapRecord::between(last + step, candle.open_time, step) {
                self.on_gap(gap).await?;
            }
        }

        self.queue.push_back(candle);
        let mut processed = 0;
        while let Some(next) = self.queue.pop_front() {
            if let Err(e) = self.process_one(next).await {
                self.queue.clear();
                return Err(e);
            }
            processed += 1;
        }
        Ok(processed)
    }

    async fn on_gap(&mut self, gap: GapRecord) -> Result<(), LiveError> {
        self.stats.gaps += 1;
        log::warn!(
            "⚠️  Gap detected: {} candles missing from {}",
            gap.missing_candles,
            gap.expected_open_time
        );
        self.gaps.write(&gap, gap.expected_open_time)?;
        self.emit(LiveEvent::Gap(gap.clone())).await;

        let source = match &self.repair {
            Some(source) if gap.missing_candles <= self.max_gap_repair => source.clone(),
            _ => return Ok(()),
        };

        let step = self.stream.interval.duration_ms();
        let end = gap.actual_open_time - step;
        let mut fetched = match source
            .fetch_range(&self.stream, gap.expected_open_time, end)
            .await
        {
            Ok(candles) => candles,
            Err(e) => {
                log::warn!("⚠️  Live gap repair failed, leaving it to reconciliation: {}", e);
                return Ok(());
            }
        };

        fetched.retain(|c| {
            self.stream.owns(c) && c.open_time >= gap.expected_open_time && c.open_time <= end
        });
        fetched.sort_by_key(|c| c.open_time);
        fetched.dedup_by_key(|c| c.open_time);
        fetched.truncate(REPAIR_QUEUE_CAP);

        log::info!("🩹 Queued {} repair candles for gap {}", fetched.len(), gap.key());
        self.stats.repaired += fetched.len() as u64;
        self.queue.extend(fetched);
        Ok(())
    }

    async fn process_one(&mut self, candle: Candle) -> Result<(), LiveError> {
        if self.last_open_time.map_or(false, |last| candle.open_time <= last) {
            return Ok(());
        }

        self.candles.write(&candle, candle.open_time)?;
        let derived = self.engine.process(&candle);
        self.last_open_time = Some(candle.open_time);
        self.stats.processed += 1;

        for agg in derived.aggregates {
            if let Some(store) = self.aggregates.get_mut(&agg.interval) {
                store.write(&agg, agg.open_time)?;
            }
            self.stats.aggregates += 1;
            self.emit(LiveEvent::Derived(agg)).await;
        }

        for swing in derived.swings {
            if let Some(store) = self.swings.get_mut(&swing.interval) {
                store.write(&swing, swing.open_time)?;
            }
            self.stats.swings += 1;
            self.emit(LiveEvent::Swing(swing)).await;
        }

        self.emit(LiveEvent::Base(derived.point)).await;
        Ok(())
    }

    async fn emit(&self, event: LiveEvent) {
        if let Some(tx) = &self.events {
            if tx.send(event).await.is_err() {
                log::debug!("Event receiver dropped");
            }
        }
    }

    /// Flush and release every open partition.
    pub fn close(&mut self) -> Result<(), StoreError> {
        self.candles.close()?;
        self.gaps.close()?;
        for store in self.aggregates.values_mut() {
            store.close()?;
        }
        for store in self.swings.values_mut() {
            store.close()?;
        }
        Ok(())
    }
}
