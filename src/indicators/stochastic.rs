use super::window::RollingWindow;
use serde::{Deserialize, Serialize};

/// Stochastic oscillator: %K over the last `k_period` highs/lows and %D as
/// the simple average of the last `d_period` %K values.
#[derive(Debug, Clone)]
pub struct Stochastic {
    highs: RollingWindow,
    lows: RollingWindow,
    k_values: RollingWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StochasticOutput {
    pub k: f64,
    /// `None` until `d_period` %K values exist.
    pub d: Option<f64>,
}

impl Stochastic {
    pub fn new(k_period: usize, d_period: usize) -> Self {
        Self {
            highs: RollingWindow::new(k_period),
            lows: RollingWindow::new(k_period),
            k_values: RollingWindow::new(d_period),
        }
    }

    pub fn update(&mut self, high: f64, low: f64, close: f64) -> Option<StochasticOutput> {
        self.highs.push(high);
        self.lows.push(low);
        if !self.highs.is_full() {
            return None;
        }

        let highest = self.highs.max();
        let lowest = self.lows.min();
        let range = highest - lowest;
        let k = if range == 0.0 {
            50.0
        } else {
            (close - lowest) / range * 100.0
        };

        self.k_values.push(k);
        let d = if self.k_values.is_full() {
            Some(self.k_values.mean())
        } else {
            None
        };
        Some(StochasticOutput { k, d })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k_and_d() {
        let mut st = Stochastic::new(2, 2);
        assert!(st.update(10.0, 8.0, 9.0).is_none());
        // range 8..12, close 12 -> 100
        let out = st.update(12.0, 9.0, 12.0).unwrap();
        assert_eq!(out.k, 100.0);
        assert_eq!(out.d, None);
        // range 9..12, close 10.5 -> 50
        let out = st.update(11.0, 10.0, 10.5).unwrap();
        assert_eq!(out.k, 50.0);
        assert_eq!(out.d, Some(75.0));
    }

    #[test]
    fn test_flat_range_is_fifty() {
        let mut st = Stochastic::new(1, 1);
        let out = st.update(5.0, 5.0, 5.0).unwrap();
        assert_eq!(out.k, 50.0);
        assert_eq!(out.d, Some(50.0));
    }
}
