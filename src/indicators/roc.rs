use super::window::RollingWindow;

/// Rate of change: percent change versus the sample `period` steps back.
#[derive(Debug, Clone)]
pub struct Roc {
    history: RollingWindow,
}

impl Roc {
    pub fn new(period: usize) -> Self {
        Self {
            history: RollingWindow::new(period.max(1) + 1),
        }
    }

    pub fn update(&mut self, value: f64) -> Option<f64> {
        self.history.push(value);
        if !self.history.is_full() {
            return None;
        }
        let back = self.history.front()?;
        if back == 0.0 {
            return Some(0.0);
        }
        Some((value - back) / back * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roc_against_period_back() {
        let mut roc = Roc::new(2);
        assert_eq!(roc.update(100.0), None);
        assert_eq!(roc.update(105.0), None);
        assert_eq!(roc.update(110.0), Some(10.0));
        let v = roc.update(84.0).unwrap();
        assert!((v - -20.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_base_is_zero() {
        let mut roc = Roc::new(1);
        roc.update(0.0);
        assert_eq!(roc.update(5.0), Some(0.0));
    }
}
