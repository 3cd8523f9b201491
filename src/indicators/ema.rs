/// Exponential Moving Average: incremental computation.
///
/// Behaviour:
///   sample 0  → value = price (seed with the first observation)
///   sample 1+ → value = α·price + (1−α)·prev   where α = 2/(period+1)
///
/// The value is tracked from the very first sample, but `update` only reports
/// it once `period` samples have been seen.
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    value: f64,
    period: usize,
    count: usize,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            alpha: 2.0 / (period as f64 + 1.0),
            value: 0.0,
            period,
            count: 0,
        }
    }

    pub fn update(&mut self, price: f64) -> Option<f64> {
        if self.count == 0 {
            self.value = price;
        } else {
            self.value = self.alpha * price + (1.0 - self.alpha) * self.value;
        }
        self.count += 1;
        self.current()
    }

    /// Last value, `None` while warming up.
    pub fn current(&self) -> Option<f64> {
        if self.is_warm() {
            Some(self.value)
        } else {
            None
        }
    }

    pub fn is_warm(&self) -> bool {
        self.count >= self.period
    }
}
