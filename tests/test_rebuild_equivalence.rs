//! Integration test: derived rebuild reproduces live processing
//!
//! 500 literal 1m candles are pushed through the live path into one store,
//! the same base candles are upserted into a second store and rebuilt there.
//! Both stores must end up with the same swing set and the same aggregates.

use klineflow::jobs::{run_rebuild, JobKind, JobProgress, JobState, RebuildOptions, StopSignal};
use klineflow::market::{Candle, Interval};
use klineflow::pipeline::{LiveIngestor, PipelineConfig};
use klineflow::series::SwingEvent;
use klineflow::store::{list_days, StoreLayout};
use std::collections::BTreeMap;
use tempfile::TempDir;
use tokio::sync::watch;

// 2021-01-01T20:00:00Z, so the run crosses midnight
const START: i64 = 1_609_531_200_000;
const STEP: i64 = 60_000;
const FEB_2021: i64 = 1_612_137_600_000;

fn make_candles(count: i64) -> Vec<Candle> {
    let mut prev_close = 100.0;
    (0..count)
        .map(|i| {
            let x = i as f64;
            let close = 100.0 + 8.0 * (x * 0.07).sin() + 2.5 * (x * 0.53).sin() + ((i * 37) % 11) as f64 * 0.05;
            let open = prev_close;
            prev_close = close;
            let high = open.max(close) + 0.2 + ((i * 13) % 5) as f64 * 0.1;
            let low = open.min(close) - 0.2 - ((i * 7) % 5) as f64 * 0.1;
            Candle {
                exchange: "binance".to_string(),
                symbol: "BTCUSDT".to_string(),
                interval: Interval::Min1,
                open_time: START + i * STEP,
                close_time: START + i * STEP + STEP - 1,
                open,
                high,
                low,
                close,
                volume: 1.0 + (i % 9) as f64,
                quote_volume: close * (1.0 + (i % 9) as f64),
                trades: 10 + (i % 4) as u64,
                taker_buy_base: 0.5,
                taker_buy_quote: close * 0.5,
            }
        })
        .collect()
}

fn config(dir: &TempDir) -> PipelineConfig {
    PipelineConfig {
        data_dir: dir.path().to_path_buf(),
        derived_intervals: vec![Interval::Min5, Interval::Min15],
        pivot_len: 3,
        series_cap: 200,
        ..PipelineConfig::default()
    }
}

fn all_swings(cfg: &PipelineConfig, interval: Interval) -> Vec<(String, i64, String)> {
    let layout = cfg.layout();
    let stream = cfg.base_stream().with_interval(interval);
    let mut out = Vec::new();
    for day in list_days(&layout.swing_dir(&stream, cfg.pivot_len)).unwrap() {
        let swings: Vec<SwingEvent> = layout.read_swings(&stream, cfg.pivot_len, &day).unwrap();
        out.extend(
            swings
                .into_iter()
                .map(|s| (s.id, s.open_time, format!("{}@{}", s.swing_type, s.price))),
        );
    }
    out.sort();
    out
}

fn all_candles(layout: &StoreLayout, cfg: &PipelineConfig, interval: Interval) -> Vec<Candle> {
    let stream = cfg.base_stream().with_interval(interval);
    let mut out = Vec::new();
    for day in layout.candle_days(&stream).unwrap() {
        out.extend(layout.read_candles(&stream, &day).unwrap());
    }
    out
}

#[tokio::test]
async fn test_rebuild_matches_live_processing() {
    let candles = make_candles(500);

    // live path
    let live_dir = TempDir::new().unwrap();
    let live_cfg = config(&live_dir);
    let mut live = LiveIngestor::new(&live_cfg);
    for candle in &candles {
        live.handle_candle(candle.clone()).await.unwrap();
    }
    live.close().unwrap();
    assert_eq!(live.stats().processed, 500);

    // same base candles, rebuilt
    let rebuild_dir = TempDir::new().unwrap();
    let rebuild_cfg = config(&rebuild_dir);
    let layout = rebuild_cfg.layout();
    let stream = rebuild_cfg.base_stream();
    let mut by_day: BTreeMap<String, Vec<Candle>> = BTreeMap::new();
    for candle in &candles {
        by_day
            .entry(klineflow::market::date_key(candle.open_time))
            .or_default()
            .push(candle.clone());
    }
    assert_eq!(by_day.len(), 2);
    for (day, batch) in by_day {
        layout.upsert_candles(&stream, &day, batch).unwrap();
    }

    let (tx, _rx) = watch::channel(JobProgress::idle(JobKind::Rebuild));
    let result = run_rebuild(
        &rebuild_cfg,
        RebuildOptions {
            max_days: None,
            now_ms: Some(FEB_2021),
        },
        &StopSignal::new(),
        &tx,
    )
    .await;
    assert_eq!(result.state, JobState::Done, "{}", result.message);
    assert_eq!(result.days_scanned, 2);

    for interval in [Interval::Min1, Interval::Min5, Interval::Min15] {
        let live_swings = all_swings(&live_cfg, interval);
        let rebuilt_swings = all_swings(&rebuild_cfg, interval);
        if interval == Interval::Min1 {
            assert!(!live_swings.is_empty(), "test data must produce base swings");
        }
        assert_eq!(live_swings, rebuilt_swings, "swing sets differ for {}", interval);
    }

    for interval in [Interval::Min5, Interval::Min15] {
        let live_aggs = all_candles(&live_cfg.layout(), &live_cfg, interval);
        let rebuilt_aggs = all_candles(&layout, &rebuild_cfg, interval);
        assert!(!live_aggs.is_empty());
        assert_eq!(live_aggs, rebuilt_aggs, "aggregates differ for {}", interval);
    }
    assert_eq!(all_candles(&layout, &rebuild_cfg, Interval::Min5).len(), 99);
}

#[tokio::test]
async fn test_rebuild_twice_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);
    let layout = cfg.layout();
    let stream = cfg.base_stream();
    let candles = make_candles(200);
    layout.upsert_candles(&stream, "2021-01-01", candles).unwrap();

    let opts = RebuildOptions {
        max_days: None,
        now_ms: Some(FEB_2021),
    };
    let (tx, _rx) = watch::channel(JobProgress::idle(JobKind::Rebuild));
    let first = run_rebuild(&cfg, opts.clone(), &StopSignal::new(), &tx).await;
    assert_eq!(first.state, JobState::Done);

    let swing_path = layout.swing_path(&stream, cfg.pivot_len, "2021-01-01");
    let agg_path = layout.candle_path(&stream.with_interval(Interval::Min5), "2021-01-01");
    let swings_once = std::fs::read(&swing_path).unwrap();
    let aggs_once = std::fs::read(&agg_path).unwrap();

    let second = run_rebuild(&cfg, opts, &StopSignal::new(), &tx).await;
    assert_eq!(second.state, JobState::Done);
    assert_eq!(std::fs::read(&swing_path).unwrap(), swings_once);
    assert_eq!(std::fs::read(&agg_path).unwrap(), aggs_once);
}

#[tokio::test]
async fn test_stopped_rebuild_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);
    let layout = cfg.layout();
    layout
        .upsert_candles(&cfg.base_stream(), "2021-01-01", make_candles(100))
        .unwrap();

    let stop = StopSignal::new();
    stop.stop();
    let (tx, rx) = watch::channel(JobProgress::idle(JobKind::Rebuild));
    let result = run_rebuild(&cfg, RebuildOptions::default(), &stop, &tx).await;

    assert_eq!(result.state, JobState::Stopped);
    assert_eq!(rx.borrow().state, JobState::Stopped);
    assert!(!layout.swing_dir(&cfg.base_stream(), cfg.pivot_len).exists());
}
