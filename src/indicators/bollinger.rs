use super::window::RollingWindow;
use serde::{Deserialize, Serialize};

/// Bollinger Bands: rolling mean ± k·population std dev, plus %B.
#[derive(Debug, Clone)]
pub struct BollingerBands {
    window: RollingWindow,
    num_std: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BollingerOutput {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    pub percent_b: f64,
}

impl BollingerBands {
    pub fn new(period: usize, num_std: f64) -> Self {
        Self {
            window: RollingWindow::new(period),
            num_std,
        }
    }

    pub fn update(&mut self, close: f64) -> Option<BollingerOutput> {
        self.window.push(close);
        if !self.window.is_full() {
            return None;
        }
        let middle = self.window.mean();
        let std = self.window.std_pop();
        let upper = middle + self.num_std * std;
        let lower = middle - self.num_std * std;
        let width = upper - lower;
        let percent_b = if width == 0.0 {
            0.5
        } else {
            (close - lower) / width
        };
        Some(BollingerOutput {
            upper,
            middle,
            lower,
            percent_b,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_band_has_centered_percent_b() {
        let mut bb = BollingerBands::new(3, 2.0);
        assert!(bb.update(5.0).is_none());
        assert!(bb.update(5.0).is_none());
        let out = bb.update(5.0).unwrap();
        assert_eq!(out.upper, 5.0);
        assert_eq!(out.lower, 5.0);
        assert_eq!(out.percent_b, 0.5);
    }

    #[test]
    fn test_population_std() {
        let mut bb = BollingerBands::new(2, 1.0);
        bb.update(1.0);
        // mean 2, population std 1
        let out = bb.update(3.0).unwrap();
        assert_eq!(out.middle, 2.0);
        assert_eq!(out.upper, 3.0);
        assert_eq!(out.lower, 1.0);
        assert_eq!(out.percent_b, 1.0);
    }
}
