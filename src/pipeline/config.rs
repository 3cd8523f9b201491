//! Pipeline configuration from environment variables

use crate::indicators::IndicatorConfig;
use crate::market::{Interval, StreamKey};
use crate::sources::{MarketKind, RANGE_LIMIT};
use crate::store::StoreLayout;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}'")]
    InvalidValue { var: &'static str, value: String },
}

/// Configuration for one (exchange, market, symbol) pipeline
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root directory of the candle/swing/gap stores
    pub data_dir: PathBuf,

    pub exchange: String,

    pub market: MarketKind,

    pub symbol: String,

    /// Interval of the ingested candles
    pub base_interval: Interval,

    /// Coarser intervals aggregated from the base stream
    pub derived_intervals: Vec<Interval>,

    /// Neighbours required on each side of a swing
    pub pivot_len: usize,

    /// Retained candles per in-memory series
    pub series_cap: usize,

    /// Largest gap (in candles) repaired through the range source
    pub max_gap_repair: i64,

    pub http_timeout_secs: u64,

    /// Live candle channel buffer
    pub channel_buffer: usize,

    pub indicators: IndicatorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            exchange: "binance".to_string(),
            market: MarketKind::Spot,
            symbol: "BTCUSDT".to_string(),
            base_interval: Interval::Min1,
            derived_intervals: vec![Interval::Min5, Interval::Min15, Interval::Hour1, Interval::Hour4],
            pivot_len: 5,
            series_cap: 5_000,
            max_gap_repair: RANGE_LIMIT as i64,
            http_timeout_secs: 30,
            channel_buffer: 10_000,
            indicators: IndicatorConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `KLINE_DATA_DIR` (default: data)
    /// - `KLINE_EXCHANGE` (default: binance)
    /// - `KLINE_MARKET` (default: spot)
    /// - `KLINE_SYMBOL` (default: BTCUSDT)
    /// - `KLINE_BASE_INTERVAL` (default: 1m)
    /// - `KLINE_DERIVED_INTERVALS` (default: 5m,15m,1h,4h)
    /// - `KLINE_PIVOT_LEN` (default: 5)
    /// - `KLINE_SERIES_CAP` (default: 5000)
    /// - `KLINE_MAX_GAP_REPAIR` (default: 1000, clamped to 1000)
    /// - `KLINE_HTTP_TIMEOUT_SECS` (default: 30)
    /// - `KLINE_CHANNEL_BUFFER` (default: 10000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let numeric = |var: &'static str, default: u64| -> u64 {
            match lookup(var) {
                None => default,
                Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                    log::warn!("⚠️  {}='{}' is not a number, using {}", var, raw, default);
                    default
                }),
            }
        };

        let interval = |var: &'static str, raw: &str| -> Result<Interval, ConfigError> {
            Interval::parse(raw).ok_or_else(|| ConfigError::InvalidValue {
                var,
                value: raw.to_string(),
            })
        };

        let market = match lookup("KLINE_MARKET") {
            None => defaults.market,
            Some(raw) => MarketKind::parse(&raw).ok_or(ConfigError::InvalidValue {
                var: "KLINE_MARKET",
                value: raw,
            })?,
        };

        let base_interval = match lookup("KLINE_BASE_INTERVAL") {
            None => defaults.base_interval,
            Some(raw) => interval("KLINE_BASE_INTERVAL", &raw)?,
        };

        let mut derived_intervals = match lookup("KLINE_DERIVED_INTERVALS") {
            None => defaults.derived_intervals,
            Some(raw) => raw
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| interval("KLINE_DERIVED_INTERVALS", s))
                .collect::<Result<Vec<_>, _>>()?,
        };
        derived_intervals.retain(|iv| iv.duration_ms() > base_interval.duration_ms());
        derived_intervals.sort();
        derived_intervals.dedup();

        let max_gap_repair = numeric("KLINE_MAX_GAP_REPAIR", RANGE_LIMIT as u64).min(RANGE_LIMIT as u64);

        Ok(Self {
            data_dir: lookup("KLINE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            exchange: lookup("KLINE_EXCHANGE").unwrap_or(defaults.exchange),
            market,
            symbol: lookup("KLINE_SYMBOL")
                .map(|s| s.trim().to_uppercase())
                .unwrap_or(defaults.symbol),
            base_interval,
            derived_intervals,
            pivot_len: numeric("KLINE_PIVOT_LEN", defaults.pivot_len as u64).max(1) as usize,
            series_cap: numeric("KLINE_SERIES_CAP", defaults.series_cap as u64) as usize,
            max_gap_repair: max_gap_repair as i64,
            http_timeout_secs: numeric("KLINE_HTTP_TIMEOUT_SECS", defaults.http_timeout_secs).max(1),
            channel_buffer: numeric("KLINE_CHANNEL_BUFFER", defaults.channel_buffer as u64).max(1) as usize,
            indicators: defaults.indicators,
        })
    }

    /// The ingested (base-interval) stream.
    pub fn base_stream(&self) -> StreamKey {
        StreamKey::new(self.exchange.clone(), self.symbol.clone(), self.base_interval)
    }

    pub fn layout(&self) -> StoreLayout {
        StoreLayout::new(self.data_dir.clone())
    }

    /// Series capacity never drops below one full pivot window.
    pub fn effective_series_cap(&self) -> usize {
        self.series_cap.max(2 * self.pivot_len + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<PipelineConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = load(&[]).unwrap();

        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.exchange, "binance");
        assert_eq!(config.market, MarketKind::Spot);
        assert_eq!(config.symbol, "BTCUSDT");
        assert_eq!(config.base_interval, Interval::Min1);
        assert_eq!(
            config.derived_intervals,
            vec![Interval::Min5, Interval::Min15, Interval::Hour1, Interval::Hour4]
        );
        assert_eq!(config.pivot_len, 5);
        assert_eq!(config.series_cap, 5_000);
        assert_eq!(config.max_gap_repair, 1_000);
        assert_eq!(config.channel_buffer, 10_000);
    }

    #[test]
    fn test_custom_config() {
        let config = load(&[
            ("KLINE_DATA_DIR", "/tmp/klines"),
            ("KLINE_MARKET", "futures"),
            ("KLINE_SYMBOL", "ethusdt"),
            ("KLINE_BASE_INTERVAL", "5m"),
            ("KLINE_DERIVED_INTERVALS", "1h, 1m, 15m,1h"),
            ("KLINE_PIVOT_LEN", "3"),
            ("KLINE_MAX_GAP_REPAIR", "50000"),
        ])
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/klines"));
        assert_eq!(config.market, MarketKind::Futures);
        assert_eq!(config.symbol, "ETHUSDT");
        assert_eq!(config.base_interval, Interval::Min5);
        // finer-than-base intervals are dropped, the rest sorted and unique
        assert_eq!(config.derived_intervals, vec![Interval::Min15, Interval::Hour1]);
        assert_eq!(config.pivot_len, 3);
        assert_eq!(config.max_gap_repair, 1_000);
    }

    #[test]
    fn test_bad_values() {
        let config = load(&[("KLINE_SERIES_CAP", "lots")]).unwrap();
        assert_eq!(config.series_cap, 5_000);

        assert!(matches!(
            load(&[("KLINE_BASE_INTERVAL", "7m")]),
            Err(ConfigError::InvalidValue { var: "KLINE_BASE_INTERVAL", .. })
        ));
    }

    #[test]
    fn test_series_cap_covers_pivot_window() {
        let config = load(&[("KLINE_SERIES_CAP", "4"), ("KLINE_PIVOT_LEN", "5")]).unwrap();
        assert_eq!(config.effective_series_cap(), 11);
    }
}
