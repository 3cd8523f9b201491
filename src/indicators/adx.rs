use super::atr::true_range;
use super::window::RollingWindow;
use serde::{Deserialize, Serialize};

/// ADX (Average Directional Index) with period-window sums.
///
/// Algorithm:
/// 1. Per bar (from the second one) compute +DM, −DM (only the larger survives) and TR
/// 2. Sum each over the last `period` bars
/// 3. +DI = ΣDM+ / ΣTR × 100, −DI = ΣDM− / ΣTR × 100
/// 4. DX = |+DI − −DI| / (+DI + −DI) × 100, 0 when the DI sum is 0
/// 5. ADX = mean of the last `period` DX values
#[derive(Debug, Clone)]
pub struct Adx {
    prev: Option<(f64, f64, f64)>,
    plus_dm: RollingWindow,
    minus_dm: RollingWindow,
    tr: RollingWindow,
    dx: RollingWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdxOutput {
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
}

impl Adx {
    pub fn new(period: usize) -> Self {
        Self {
            prev: None,
            plus_dm: RollingWindow::new(period),
            minus_dm: RollingWindow::new(period),
            tr: RollingWindow::new(period),
            dx: RollingWindow::new(period),
        }
    }

    pub fn update(&mut self, high: f64, low: f64, close: f64) -> Option<AdxOutput> {
        let (prev_high, prev_low, prev_close) = match self.prev.replace((high, low, close)) {
            Some(prev) => prev,
            None => return None,
        };

        let up = high - prev_high;
        let down = prev_low - low;
        let plus_dm = if up > down && up > 0.0 { up } else { 0.0 };
        let minus_dm = if down > up && down > 0.0 { down } else { 0.0 };

        self.plus_dm.push(plus_dm);
        self.minus_dm.push(minus_dm);
        self.tr.push(true_range(high, low, Some(prev_close)));
        if !self.tr.is_full() {
            return None;
        }

        let tr_sum = self.tr.sum();
        let (plus_di, minus_di) = if tr_sum == 0.0 {
            (0.0, 0.0)
        } else {
            (
                self.plus_dm.sum() / tr_sum * 100.0,
                self.minus_dm.sum() / tr_sum * 100.0,
            )
        };
        let di_sum = plus_di + minus_di;
        let dx = if di_sum == 0.0 {
            0.0
        } else {
            (plus_di - minus_di).abs() / di_sum * 100.0
        };

        self.dx.push(dx);
        if !self.dx.is_full() {
            return None;
        }
        Some(AdxOutput {
            adx: self.dx.mean(),
            plus_di,
            minus_di,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steady_uptrend_is_fully_directional() {
        let mut adx = Adx::new(3);
        let mut out = None;
        for i in 0..7 {
            let base = 100.0 + i as f64;
            out = adx.update(base + 1.0, base - 1.0, base);
        }
        let out = out.unwrap();
        assert_eq!(out.minus_di, 0.0);
        assert!(out.plus_di > 0.0);
        assert!((out.adx - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_warmup_length() {
        // first bar primes, `period` bars fill the DM window, `period` DX values fill ADX
        let mut adx = Adx::new(3);
        let results: Vec<_> = (0..6)
            .map(|i| adx.update(10.0 + i as f64, 9.0 + i as f64, 9.5 + i as f64))
            .collect();
        assert!(results[..5].iter().all(|r| r.is_none()));
        assert!(results[5].is_some());
    }
}
