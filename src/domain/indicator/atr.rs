//! Average True Range.
//!
//! The first bar's true range is high - low. The seed is the mean of the first
//! n true ranges, then ATR = (ATR_prev * (n-1) + TR) / n.

use crate::domain::bar::Bar;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    prev_close: Option<f64>,
    seed_sum: f64,
    count: usize,
    value: Option<f64>,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        Atr {
            period: period.max(1),
            prev_close: None,
            seed_sum: 0.0,
            count: 0,
            value: None,
        }
    }

    pub fn update(&mut self, bar: &Bar) -> Option<f64> {
        let tr = match self.prev_close {
            Some(prev) => bar.true_range(prev),
            None => bar.high - bar.low,
        };
        self.prev_close = Some(bar.close);

        let n = self.period as f64;
        match self.value {
            Some(prev) => self.value = Some((prev * (n - 1.0) + tr) / n),
            None => {
                self.seed_sum += tr;
                self.count += 1;
                if self.count == self.period {
                    self.value = Some(self.seed_sum / n);
                }
            }
        }
        self.value
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}
