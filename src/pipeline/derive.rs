//! Per-candle derivation shared by the live path and the rebuild job
//!
//! ```text
//! base candle ──▶ base CandleSeries ──▶ swing check (pivot_len back)
//!      │
//!      └──▶ TimeframeAggregator(5m) ──closed──▶ 5m CandleSeries ──▶ swing check
//!      └──▶ TimeframeAggregator(1h) ──closed──▶ 1h CandleSeries ──▶ swing check
//! ```
//!
//! Feeding the same base candles in the same order always yields the same
//! aggregates and swings, whichever caller drives the engine.

use super::config::PipelineConfig;
use crate::indicators::IndicatorConfig;
use crate::market::{Candle, Interval};
use crate::series::{detect_swing_at, CandleSeries, IndicatorPoint, SwingEvent, TimeframeAggregator};

struct DerivedStream {
    aggregator: TimeframeAggregator,
    series: CandleSeries,
}

/// Everything produced by one base candle.
#[derive(Debug, Clone)]
pub struct Derived {
    pub point: IndicatorPoint,
    /// Derived-interval candles closed by this base candle.
    pub aggregates: Vec<Candle>,
    /// Swings confirmed by this candle, base interval first.
    pub swings: Vec<SwingEvent>,
}

pub struct DerivationEngine {
    pivot_len: usize,
    base: CandleSeries,
    derived: Vec<DerivedStream>,
}

impl DerivationEngine {
    pub fn new(
        indicators: &IndicatorConfig,
        derived_intervals: &[Interval],
        pivot_len: usize,
        series_cap: usize,
    ) -> Self {
        let cap = series_cap.max(2 * pivot_len + 1);
        Self {
            pivot_len,
            base: CandleSeries::new(indicators, cap),
            derived: derived_intervals
                .iter()
                .map(|iv| DerivedStream {
                    aggregator: TimeframeAggregator::new(*iv),
                    series: CandleSeries::new(indicators, cap),
                })
                .collect(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            &config.indicators,
            &config.derived_intervals,
            config.pivot_len,
            config.effective_series_cap(),
        )
    }

    pub fn pivot_len(&self) -> usize {
        self.pivot_len
    }

    pub fn base_series(&self) -> &CandleSeries {
        &self.base
    }

    /// Series of a derived interval, if configured.
    pub fn derived_series(&self, interval: Interval) -> Option<&CandleSeries> {
        self.derived
            .iter()
            .find(|d| d.aggregator.target() == interval)
            .map(|d| &d.series)
    }

    /// Open time of the last base candle processed.
    pub fn last_open_time(&self) -> Option<i64> {
        self.base.last().map(|p| p.candle.open_time)
    }

    pub fn process(&mut self, candle: &Candle) -> Derived {
        let point = self.base.push(candle.clone()).clone();

        let mut swings = Vec::new();
        if let Some(swing) = confirm_swing(&self.base, self.pivot_len) {
            swings.push(swing);
        }

        let mut aggregates = Vec::new();
        for stream in self.derived.iter_mut() {
            if let Some(closed) = stream.aggregator.update(candle) {
                stream.series.push(closed.clone());
                if let Some(swing) = confirm_swing(&stream.series, self.pivot_len) {
                    swings.push(swing);
                }
                aggregates.push(closed);
            }
        }

        Derived {
            point,
            aggregates,
            swings,
        }
    }
}

/// The newest candle confirms the pivot `pivot_len` positions back.
fn confirm_swing(series: &CandleSeries, pivot_len: usize) -> Option<SwingEvent> {
    let index = series.len().checked_sub(pivot_len + 1)?;
    let swing = detect_swing_at(series, pivot_len, index)?;
    let pivot = &series.at(index)?.candle;
    Some(SwingEvent::new(pivot, pivot_len, swing))
}
