use super::window::RollingWindow;

/// True range of one bar given the previous close (`None` on the first bar).
pub fn true_range(high: f64, low: f64, prev_close: Option<f64>) -> f64 {
    match prev_close {
        Some(pc) => (high - low).max((high - pc).abs()).max((low - pc).abs()),
        None => high - low,
    }
}

/// Average True Range: simple average of the last `period` true ranges.
#[derive(Debug, Clone)]
pub struct Atr {
    window: RollingWindow,
    prev_close: Option<f64>,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        Self {
            window: RollingWindow::new(period),
            prev_close: None,
        }
    }

    pub fn update(&mut self, high: f64, low: f64, close: f64) -> Option<f64> {
        let tr = true_range(high, low, self.prev_close);
        self.prev_close = Some(close);
        self.window.push(tr);
        if self.window.is_full() {
            Some(self.window.mean())
        } else {
            None
        }
    }
}
