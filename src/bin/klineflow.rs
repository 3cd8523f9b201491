//! klineflow - maintenance jobs and live candle ingestion
//!
//! Usage:
//!   klineflow backfill  [--max MONTHS]
//!   klineflow reconcile [--max DAYS]
//!   klineflow rebuild   [--max DAYS]
//!   klineflow live      < candles.ndjson
//!
//! `live` reads one JSON candle per stdin line and writes swing, derived
//! candle and gap events to stdout as NDJSON.
//!
//! Environment variables:
//!   KLINE_DATA_DIR - store root (default: data)
//!   KLINE_SYMBOL - symbol (default: BTCUSDT)
//!   KLINE_MARKET - spot or futures (default: spot)
//!   RUST_LOG - log filter (default: info)
//!   see `PipelineConfig::from_env` for the rest

use dotenv::dotenv;
use klineflow::jobs::{
    BackfillOptions, JobHandle, JobOrchestrator, JobState, RebuildOptions, ReconcileOptions,
};
use klineflow::market::Candle;
use klineflow::pipeline::{start_live_ingestion, LiveEvent, LiveIngestor, PipelineConfig};
use klineflow::sources::BinanceSource;
use log::{error, info, warn};
use std::env;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

fn parse_max_from_args(args: &[String]) -> Result<Option<u64>, Box<dyn std::error::Error>> {
    match args.iter().position(|x| x == "--max") {
        None => Ok(None),
        Some(idx) => {
            let raw = args.get(idx + 1).ok_or("--max needs a value")?;
            Ok(Some(raw.parse::<u64>().map_err(|_| format!("invalid --max '{}'", raw))?))
        }
    }
}

fn usage() -> &'static str {
    "usage: klineflow <backfill|reconcile|rebuild|live> [--max N]"
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).ok_or_else(usage)?;
    let max = parse_max_from_args(&args)?;

    let config = Arc::new(PipelineConfig::from_env()?);
    let source = Arc::new(BinanceSource::new(config.market, config.http_timeout_secs)?);

    info!("🚀 klineflow {}", command);
    info!("   ├─ Data dir: {}", config.data_dir.display());
    info!("   ├─ Stream: {}:{}:{} ({:?})", config.exchange, config.symbol, config.base_interval, config.market);
    info!("   ├─ Derived: {:?}", config.derived_intervals);
    info!("   └─ Pivot length: {}", config.pivot_len);

    let orchestrator = JobOrchestrator::new(config.clone(), source.clone(), source.clone());
    let handle = match command {
        "backfill" => orchestrator.start_backfill(BackfillOptions {
            max_months: max,
            now_ms: None,
        })?,
        "reconcile" => {
            let live_head = config.layout().latest_open_time(&config.base_stream())?;
            orchestrator.start_reconcile(ReconcileOptions {
                max_days: max.map(|m| m as usize),
                live_head,
                now_ms: None,
            })?
        }
        "rebuild" => orchestrator.start_rebuild(RebuildOptions {
            max_days: max.map(|m| m as usize),
            now_ms: None,
        })?,
        "live" => return run_live(config, source).await,
        other => return Err(format!("unknown command '{}'\n{}", other, usage()).into()),
    };

    run_job(handle).await
}

async fn run_job(handle: JobHandle) -> Result<(), Box<dyn std::error::Error>> {
    let kind = handle.kind();
    let mut progress = handle.progress();

    let watcher = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let p = progress.borrow().clone();
            if p.state.is_terminal() {
                break;
            }
            info!(
                "📊 {} {}: months={} days={} candles={} gaps={}/{} swings={}",
                kind,
                p.current.as_deref().unwrap_or("-"),
                p.months_processed,
                p.days_written,
                p.candles_ingested,
                p.gaps_repaired,
                p.gaps_found,
                p.swings_written
            );
        }
    });

    info!("🔄 Press CTRL+C to stop {} gracefully", kind);
    let stopper = handle.stop_signal();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("⚠️  Received CTRL+C, stopping {} after the current unit...", kind);
            stopper.stop();
        }
    });

    let last = handle.join().await;
    ctrl_c.abort();
    let _ = watcher.await;

    info!("🏁 {} finished: {:?}", kind, last.state);
    info!("   ├─ Message: {}", last.message);
    info!("   ├─ Days written: {}", last.days_written);
    info!("   ├─ Candles ingested: {}", last.candles_ingested);
    info!("   ├─ Gaps: {} found, {} repaired, {} skipped", last.gaps_found, last.gaps_repaired, last.gaps_skipped);
    info!("   └─ Aggregates/swings: {}/{}", last.aggregates_written, last.swings_written);

    match last.state {
        JobState::Error => Err(last.message.into()),
        _ => Ok(()),
    }
}

async fn run_live(
    config: Arc<PipelineConfig>,
    source: Arc<BinanceSource>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (event_tx, mut event_rx) = mpsc::channel::<LiveEvent>(config.channel_buffer);
    let mut ingestor = LiveIngestor::new(&config)
        .with_repair_source(source)
        .with_events(event_tx);
    ingestor.prime_from_store(config.effective_series_cap())?;

    let (tx, rx) = mpsc::channel::<Candle>(config.channel_buffer);
    let ingestion = tokio::spawn(start_live_ingestion(rx, ingestor, config.channel_buffer));

    let printer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(event) = event_rx.recv().await {
            if matches!(event, LiveEvent::Base(_)) {
                continue;
            }
            match serde_json::to_string(&event) {
                Ok(line) => {
                    if stdout.write_all(format!("{}\n", line).as_bytes()).await.is_err() {
                        break;
                    }
                }
                Err(e) => error!("❌ Failed to encode event: {}", e),
            }
        }
        let _ = stdout.flush().await;
    });

    info!("🔄 Reading candles from stdin (CTRL+C to stop)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => match serde_json::from_str::<Candle>(&line) {
                        Ok(candle) => {
                            if tx.send(candle).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("⚠️  Skipping malformed candle line: {}", e),
                    },
                    Ok(None) => {
                        info!("📭 stdin closed");
                        break;
                    }
                    Err(e) => {
                        error!("❌ Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("⚠️  Received CTRL+C, shutting down...");
                break;
            }
        }
    }

    drop(tx);
    let stats = ingestion.await?;
    let _ = printer.await;
    info!("✅ Live ingestion done: {} candles processed", stats.processed);
    Ok(())
}
