//! Bounded, indicator-annotated candle window

use crate::indicators::{IndicatorConfig, IndicatorSet, IndicatorValues};
use crate::market::Candle;
use serde::Serialize;
use std::collections::VecDeque;

/// A candle plus the indicator values computed when it was pushed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorPoint {
    pub candle: Candle,
    pub indicators: IndicatorValues,
}

/// Ordered, append-only window over a candle stream.
///
/// Points are strictly increasing by `open_time`. When the retained length
/// exceeds `max_len` the oldest points are dropped from the front.
#[derive(Debug, Clone)]
pub struct CandleSeries {
    points: VecDeque<IndicatorPoint>,
    indicators: IndicatorSet,
    max_len: usize,
}

impl CandleSeries {
    pub fn new(cfg: &IndicatorConfig, max_len: usize) -> Self {
        Self {
            points: VecDeque::new(),
            indicators: IndicatorSet::new(cfg),
            max_len: max_len.max(1),
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Run `candle` through every indicator, append the point and trim the front.
    pub fn push(&mut self, candle: Candle) -> &IndicatorPoint {
        debug_assert!(
            self.points
                .back()
                .map_or(true, |last| last.candle.open_time < candle.open_time),
            "candle series must be strictly increasing by open_time"
        );

        let indicators = self.indicators.update(&candle);
        self.points.push_back(IndicatorPoint { candle, indicators });
        while self.points.len() > self.max_len {
            self.points.pop_front();
        }
        // just pushed, never empty
        &self.points[self.points.len() - 1]
    }

    pub fn at(&self, index: usize) -> Option<&IndicatorPoint> {
        self.points.get(index)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&IndicatorPoint> {
        self.points.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndicatorPoint> {
        self.points.iter()
    }

    /// Index of the last point whose `close_time <= close_time`.
    pub fn last_index_before(&self, close_time: i64) -> Option<usize> {
        let count = self
            .points
            .partition_point(|p| p.candle.close_time <= close_time);
        count.checked_sub(1)
    }

    /// Keep only the last `n` points; `n == 0` clears the series.
    pub fn trim_to_last(&mut self, n: usize) {
        if n == 0 {
            self.points.clear();
            return;
        }
        let excess = self.points.len().saturating_sub(n);
        self.points.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Interval;

    fn candle(i: i64) -> Candle {
        Candle {
            exchange: "binance".to_string(),
            symbol: "ETHUSDT".to_string(),
            interval: Interval::Min1,
            open_time: i * 60_000,
            close_time: i * 60_000 + 59_999,
            open: 10.0,
            high: 11.0,
            low: 9.0,
            close: 10.0,
            volume: 1.0,
            quote_volume: 10.0,
            trades: 3,
            taker_buy_base: 0.5,
            taker_buy_quote: 5.0,
        }
    }

    #[test]
    fn test_cap_drops_oldest() {
        let mut series = CandleSeries::new(&IndicatorConfig::default(), 3);
        for i in 0..5 {
            series.push(candle(i));
        }
        assert_eq!(series.len(), 3);
        assert_eq!(series.at(0).unwrap().candle.open_time, 2 * 60_000);
        assert_eq!(series.last().unwrap().candle.open_time, 4 * 60_000);
    }

    #[test]
    fn test_last_index_before() {
        let mut series = CandleSeries::new(&IndicatorConfig::default(), 10);
        for i in 0..4 {
            series.push(candle(i));
        }
        assert_eq!(series.last_index_before(-1), None);
        assert_eq!(series.last_index_before(59_999), Some(0));
        assert_eq!(series.last_index_before(119_998), Some(0));
        assert_eq!(series.last_index_before(119_999), Some(1));
        assert_eq!(series.last_index_before(i64::MAX), Some(3));
    }

    #[test]
    fn test_trim_to_last() {
        let mut series = CandleSeries::new(&IndicatorConfig::default(), 10);
        for i in 0..6 {
            series.push(candle(i));
        }
        series.trim_to_last(2);
        assert_eq!(series.len(), 2);
        assert_eq!(series.at(0).unwrap().candle.open_time, 4 * 60_000);
        series.trim_to_last(5);
        assert_eq!(series.len(), 2);
        series.trim_to_last(0);
        assert!(series.is_empty());
    }

    #[test]
    fn test_indicators_keep_running_across_trims() {
        let mut capped = CandleSeries::new(&IndicatorConfig::default(), 2);
        let mut full = CandleSeries::new(&IndicatorConfig::default(), 100);
        for i in 0..40 {
            capped.push(candle(i));
            full.push(candle(i));
        }
        assert_eq!(capped.last(), full.last());
    }
}
