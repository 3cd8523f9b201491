//! Base-interval → coarser-interval candle aggregation

use crate::market::{Candle, Interval};

/// Buckets a base candle stream into `target`-sized candles.
///
/// Holds one in-progress bucket. A base candle that falls into a new bucket
/// closes the current one and is returned from `update`. Missing base candles
/// are not synthesized: a bucket only covers what was actually seen.
#[derive(Debug, Clone)]
pub struct TimeframeAggregator {
    target: Interval,
    current: Option<Candle>,
}

impl TimeframeAggregator {
    pub fn new(target: Interval) -> Self {
        Self {
            target,
            current: None,
        }
    }

    pub fn target(&self) -> Interval {
        self.target
    }

    /// The bucket still being filled.
    pub fn current(&self) -> Option<&Candle> {
        self.current.as_ref()
    }

    pub fn update(&mut self, base: &Candle) -> Option<Candle> {
        let key = self.target.bucket_start(base.open_time);

        if let Some(bucket) = self.current.as_mut() {
            if bucket.open_time == key {
                bucket.high = bucket.high.max(base.high);
                bucket.low = bucket.low.min(base.low);
                bucket.close = base.close;
                bucket.volume += base.volume;
                bucket.quote_volume += base.quote_volume;
                bucket.trades += base.trades;
                bucket.taker_buy_base += base.taker_buy_base;
                bucket.taker_buy_quote += base.taker_buy_quote;
                return None;
            }
        }

        let fresh = self.open_bucket(key, base);
        self.current.replace(fresh)
    }

    fn open_bucket(&self, key: i64, base: &Candle) -> Candle {
        Candle {
            exchange: base.exchange.clone(),
            symbol: base.symbol.clone(),
            interval: self.target,
            open_time: key,
            close_time: key + self.target.duration_ms() - 1,
            open: base.open,
            high: base.high,
            low: base.low,
            close: base.close,
            volume: base.volume,
            quote_volume: base.quote_volume,
            trades: base.trades,
            taker_buy_base: base.taker_buy_base,
            taker_buy_quote: base.taker_buy_quote,
        }
    }
}
