//! Incremental technical indicators
//!
//! Every indicator is an independent single-pass state machine: feed one sample
//! per call, get `None` while it warms up, then a value on every call after.
//! `IndicatorSet` bundles the configured set and produces one
//! `IndicatorValues` per candle.

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod roc;
pub mod rsi;
pub mod sma;
pub mod stochastic;
pub mod window;

pub use adx::{Adx, AdxOutput};
pub use atr::Atr;
pub use bollinger::{BollingerBands, BollingerOutput};
pub use ema::Ema;
pub use macd::{Macd, MacdOutput};
pub use roc::Roc;
pub use rsi::Rsi;
pub use sma::Sma;
pub use stochastic::{Stochastic, StochasticOutput};

use crate::market::Candle;
use serde::{Deserialize, Serialize};

/// Periods for the indicator set attached to every candle.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorConfig {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub sma: usize,
    pub rsi: usize,
    pub atr: usize,
    pub bollinger: usize,
    pub bollinger_std: f64,
    pub macd: (usize, usize, usize),
    pub stochastic: (usize, usize),
    pub roc: usize,
    pub adx: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            ema_fast: 20,
            ema_slow: 50,
            sma: 20,
            rsi: 14,
            atr: 14,
            bollinger: 20,
            bollinger_std: 2.0,
            macd: (12, 26, 9),
            stochastic: (14, 3),
            roc: 12,
            adx: 14,
        }
    }
}

/// Indicator values for one candle; `None` until the indicator is warm.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorValues {
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub sma: Option<f64>,
    pub rsi: Option<f64>,
    pub atr: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,
    pub bb_percent_b: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub stoch_k: Option<f64>,
    pub stoch_d: Option<f64>,
    pub roc: Option<f64>,
    pub adx: Option<f64>,
    pub plus_di: Option<f64>,
    pub minus_di: Option<f64>,
}

/// All configured indicators, updated in lock-step.
#[derive(Debug, Clone)]
pub struct IndicatorSet {
    ema_fast: Ema,
    ema_slow: Ema,
    sma: Sma,
    rsi: Rsi,
    atr: Atr,
    bollinger: BollingerBands,
    macd: Macd,
    stochastic: Stochastic,
    roc: Roc,
    adx: Adx,
}

impl IndicatorSet {
    pub fn new(cfg: &IndicatorConfig) -> Self {
        Self {
            ema_fast: Ema::new(cfg.ema_fast),
            ema_slow: Ema::new(cfg.ema_slow),
            sma: Sma::new(cfg.sma),
            rsi: Rsi::new(cfg.rsi),
            atr: Atr::new(cfg.atr),
            bollinger: BollingerBands::new(cfg.bollinger, cfg.bollinger_std),
            macd: Macd::new(cfg.macd.0, cfg.macd.1, cfg.macd.2),
            stochastic: Stochastic::new(cfg.stochastic.0, cfg.stochastic.1),
            roc: Roc::new(cfg.roc),
            adx: Adx::new(cfg.adx),
        }
    }

    pub fn update(&mut self, candle: &Candle) -> IndicatorValues {
        let (h, l, c) = (candle.high, candle.low, candle.close);
        let bb = self.bollinger.update(c);
        let macd = self.macd.update(c);
        let stoch = self.stochastic.update(h, l, c);
        let adx = self.adx.update(h, l, c);

        IndicatorValues {
            ema_fast: self.ema_fast.update(c),
            ema_slow: self.ema_slow.update(c),
            sma: self.sma.update(c),
            rsi: self.rsi.update(c),
            atr: self.atr.update(h, l, c),
            bb_upper: bb.map(|b| b.upper),
            bb_middle: bb.map(|b| b.middle),
            bb_lower: bb.map(|b| b.lower),
            bb_percent_b: bb.map(|b| b.percent_b),
            macd: macd.map(|m| m.macd),
            macd_signal: macd.map(|m| m.signal),
            macd_histogram: macd.map(|m| m.histogram),
            stoch_k: stoch.map(|s| s.k),
            stoch_d: stoch.and_then(|s| s.d),
            roc: self.roc.update(c),
            adx: adx.map(|a| a.adx),
            plus_di: adx.map(|a| a.plus_di),
            minus_di: adx.map(|a| a.minus_di),
        }
    }
}

impl Default for IndicatorSet {
    fn default() -> Self {
        Self::new(&IndicatorConfig::default())
    }
}
