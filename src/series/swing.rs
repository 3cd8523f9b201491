//! Pivot ("swing") detection over a candle series

use super::candle_series::CandleSeries;
use crate::market::{Candle, Interval};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwingType {
    High,
    Low,
}

impl SwingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwingType::High => "high",
            SwingType::Low => "low",
        }
    }
}

impl fmt::Display for SwingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Swing {
    pub swing_type: SwingType,
    pub price: f64,
}

/// Check whether the point at `index` is a pivot confirmed by `pivot_len`
/// neighbours on each side.
///
/// A high pivot needs a high strictly above every neighbour's high, a low
/// pivot a low strictly below every neighbour's low. Ties disqualify, and a
/// candle that is both (or neither) is not a swing.
pub fn detect_swing_at(series: &CandleSeries, pivot_len: usize, index: usize) -> Option<Swing> {
    if pivot_len > index || index + pivot_len >= series.len() {
        return None;
    }
    let pivot = &series.at(index)?.candle;

    let mut is_high = true;
    let mut is_low = true;
    for neighbour in (index - pivot_len)..=(index + pivot_len) {
        if neighbour == index {
            continue;
        }
        let other = &series.at(neighbour)?.candle;
        if other.high >= pivot.high {
            is_high = false;
        }
        if other.low <= pivot.low {
            is_low = false;
        }
        if !is_high && !is_low {
            return None;
        }
    }

    match (is_high, is_low) {
        (true, false) => Some(Swing {
            swing_type: SwingType::High,
            price: pivot.high,
        }),
        (false, true) => Some(Swing {
            swing_type: SwingType::Low,
            price: pivot.low,
        }),
        _ => None,
    }
}

/// A confirmed pivot, persisted once and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwingEvent {
    pub id: String,
    pub exchange: String,
    pub symbol: String,
    pub interval: Interval,
    pub pivot_len: usize,
    pub swing_type: SwingType,
    pub open_time: i64,
    pub close_time: i64,
    pub price: f64,
    /// Opaque annotations filled in by downstream feature enrichment.
    #[serde(default)]
    pub features: BTreeMap<String, serde_json::Value>,
}

impl SwingEvent {
    pub fn new(pivot: &Candle, pivot_len: usize, swing: Swing) -> Self {
        Self {
            id: Self::make_id(
                &pivot.exchange,
                &pivot.symbol,
                pivot.interval,
                pivot_len,
                swing.swing_type,
                pivot.open_time,
            ),
            exchange: pivot.exchange.clone(),
            symbol: pivot.symbol.clone(),
            interval: pivot.interval,
            pivot_len,
            swing_type: swing.swing_type,
            open_time: pivot.open_time,
            close_time: pivot.close_time,
            price: swing.price,
            features: BTreeMap::new(),
        }
    }

    pub fn make_id(
        exchange: &str,
        symbol: &str,
        interval: Interval,
        pivot_len: usize,
        swing_type: SwingType,
        open_time: i64,
    ) -> String {
        format!(
            "{}:{}:{}:p{}:{}:{}",
            exchange, symbol, interval, pivot_len, swing_type, open_time
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::IndicatorConfig;

    fn series_from(bars: &[(f64, f64)]) -> CandleSeries {
        let mut series = CandleSeries::new(&IndicatorConfig::default(), 100);
        for (i, (high, low)) in bars.iter().enumerate() {
            let t = i as i64 * 60_000;
            series.push(Candle {
                exchange: "binance".to_string(),
                symbol: "BTCUSDT".to_string(),
                interval: Interval::Min1,
                open_time: t,
                close_time: t + 59_999,
                open: (high + low) / 2.0,
                high: *high,
                low: *low,
                close: (high + low) / 2.0,
                volume: 1.0,
                quote_volume: 1.0,
                trades: 1,
                taker_buy_base: 0.0,
                taker_buy_quote: 0.0,
            });
        }
        series
    }

    #[test]
    fn test_flat_window_never_swings() {
        let series = series_from(&[(10.0, 9.0); 5]);
        assert_eq!(detect_swing_at(&series, 2, 2), None);
    }

    #[test]
    fn test_high_and_low_pivots() {
        let series = series_from(&[(10.0, 9.0), (11.0, 9.5), (13.0, 10.0), (12.0, 9.8), (11.0, 9.6)]);
        let swing = detect_swing_at(&series, 2, 2).unwrap();
        assert_eq!(swing.swing_type, SwingType::High);
        assert_eq!(swing.price, 13.0);

        let series = series_from(&[(10.0, 8.0), (10.0, 7.0), (9.9, 5.0), (10.2, 6.0), (10.1, 7.5)]);
        let swing = detect_swing_at(&series, 2, 2).unwrap();
        assert_eq!(swing.swing_type, SwingType::Low);
        assert_eq!(swing.price, 5.0);
    }

    #[test]
    fn test_equal_neighbour_disqualifies() {
        let series = series_from(&[(10.0, 9.0), (13.0, 9.5), (13.0, 10.0), (12.0, 9.8), (11.0, 9.6)]);
        assert_eq!(detect_swing_at(&series, 2, 2), None);
    }

    #[test]
    fn test_outside_bar_is_not_a_swing() {
        // highest high and lowest low at once
        let series = series_from(&[(10.0, 9.0), (11.0, 9.5), (14.0, 8.0), (12.0, 9.8), (11.0, 9.6)]);
        assert_eq!(detect_swing_at(&series, 2, 2), None);
    }

    #[test]
    fn test_needs_neighbours_on_both_sides() {
        let series = series_from(&[(10.0, 9.0), (11.0, 9.5), (13.0, 10.0), (12.0, 9.8)]);
        assert_eq!(detect_swing_at(&series, 2, 2), None);
        assert_eq!(detect_swing_at(&series, 2, 1), None);
    }

    #[test]
    fn test_id_is_deterministic() {
        let id = SwingEvent::make_id("binance", "BTCUSDT", Interval::Min1, 5, SwingType::Low, 120_000);
        assert_eq!(id, "binance:BTCUSDT:1m:p5:low:120000");
    }
}
