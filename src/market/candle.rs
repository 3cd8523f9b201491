use super::interval::Interval;
use serde::{Deserialize, Serialize};

/// One closed OHLCV bar.
///
/// `open_time` is an exact multiple of the interval duration and
/// `close_time = open_time + duration - 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    pub exchange: String,
    pub symbol: String,
    pub interval: Interval,
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub trades: u64,
    pub taker_buy_base: f64,
    pub taker_buy_quote: f64,
}

impl Candle {
    pub fn stream_key(&self) -> StreamKey {
        StreamKey {
            exchange: self.exchange.clone(),
            symbol: self.symbol.clone(),
            interval: self.interval,
        }
    }
}

/// Identifies one candle stream: (exchange, symbol, interval).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub exchange: String,
    pub symbol: String,
    pub interval: Interval,
}

impl StreamKey {
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>, interval: Interval) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
            interval,
        }
    }

    pub fn with_interval(&self, interval: Interval) -> Self {
        Self {
            exchange: self.exchange.clone(),
            symbol: self.symbol.clone(),
            interval,
        }
    }

    /// Owns `candle` if exchange, symbol and interval all match.
    pub fn owns(&self, candle: &Candle) -> bool {
        candle.interval == self.interval
            && candle.symbol == self.symbol
            && candle.exchange == self.exchange
    }
}
