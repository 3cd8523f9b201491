use super::window::RollingWindow;

/// Simple moving average over a fixed-size sliding window.
#[derive(Debug, Clone)]
pub struct Sma {
    window: RollingWindow,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Self {
            window: RollingWindow::new(period),
        }
    }

    pub fn update(&mut self, value: f64) -> Option<f64> {
        self.window.push(value);
        if self.window.is_full() {
            Some(self.window.mean())
        } else {
            None
        }
    }
}
