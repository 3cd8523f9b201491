//! Pipeline ingestion - async channel processor for live candles

use super::live::{LiveIngestor, LiveStats};
use crate::market::Candle;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};

const THROUGHPUT_LOG_SECS: u64 = 10;

/// Start live ingestion from a candle channel
///
/// Main loop:
/// 1. Receives final candles from the feed via mpsc channel
/// 2. Hands each one to `LiveIngestor::handle_candle` (gap repair included)
/// 3. Periodically logs throughput and channel health
///
/// A failing candle is logged and dropped; the loop keeps going. Runs until
/// the channel is closed, then flushes every open partition.
pub async fn start_live_ingestion(
    mut rx: mpsc::Receiver<Candle>,
    mut ingestor: LiveIngestor,
    channel_capacity: usize,
) -> LiveStats {
    let stream = ingestor.stream().clone();
    log::info!("🚀 Starting live ingestion");
    log::info!("   ├─ Stream: {}:{}:{}", stream.exchange, stream.symbol, stream.interval);
    log::info!("   ├─ Resume after: {:?}", ingestor.last_open_time());
    log::info!("   └─ Waiting for candles...");

    let mut report_timer = interval(Duration::from_secs(THROUGHPUT_LOG_SECS));
    let mut candle_count = 0u64;
    let mut last_log_time = std::time::Instant::now();
    let channel_capacity = channel_capacity.max(1);

    loop {
        tokio::select! {
            maybe_candle = rx.recv() => {
                let Some(candle) = maybe_candle else {
                    log::warn!("⚠️  Candle channel closed, stopping ingestion");
                    break;
                };
                match ingestor.handle_candle(candle).await {
                    Ok(n) => candle_count += n as u64,
                    Err(e) => log::error!("❌ Failed to ingest candle: {}", e),
                }
            }

            _ = report_timer.tick() => {
                let elapsed = last_log_time.elapsed().as_secs_f64();
                if elapsed > 0.0 && candle_count > 0 {
                    log::info!(
                        "📊 Ingestion rate: {:.1} candles/sec (last open time: {:?})",
                        candle_count as f64 / elapsed,
                        ingestor.last_open_time()
                    );
                }
                last_log_time = std::time::Instant::now();
                candle_count = 0;

                let channel_usage = rx.len();
                if channel_usage > channel_capacity / 2 {
                    log::warn!(
                        "⚠️  Channel usage high: {}/{} ({}%)",
                        channel_usage,
                        channel_capacity,
                        (channel_usage * 100) / channel_capacity
                    );
                }
            }
        }
    }

    if let Err(e) = ingestor.close() {
        log::error!("❌ Failed final flush: {}", e);
    }

    let stats = ingestor.stats();
    log::info!("✅ Live ingestion stopped");
    log::info!("   ├─ Processed: {}", stats.processed);
    log::info!("   ├─ Ignored: {}", stats.ignored);
    log::info!("   ├─ Gaps: {} ({} candles repaired)", stats.gaps, stats.repaired);
    log::info!("   └─ Swings: {}", stats.swings);
    stats
}
