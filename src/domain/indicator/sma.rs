//! Simple Moving Average over a rolling window.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    window: VecDeque<f64>,
    sum: f64,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Sma {
            period: period.max(1),
            window: VecDeque::with_capacity(period.max(1)),
            sum: 0.0,
        }
    }

    pub fn update(&mut self, input: f64) -> Option<f64> {
        self.window.push_back(input);
        self.sum += input;
        if self.window.len() > self.period {
            if let Some(old) = self.window.pop_front() {
                self.sum -= old;
            }
        }
        self.value()
    }

    pub fn value(&self) -> Option<f64> {
        (self.window.len() == self.period).then(|| self.sum / self.period as f64)
    }

    /// Population standard deviation of the current window.
    pub fn stddev(&self) -> Option<f64> {
        let mean = self.value()?;
        let variance = self
            .window
            .iter()
            .map(|v| {
                let diff = v - mean;
                diff * diff
            })
            .sum::<f64>()
            / self.period as f64;
        Some(variance.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warmup_then_rolling_mean() {
        let mut sma = Sma::new(3);
        assert!(sma.update(1.0).is_none());
        assert!(sma.update(2.0).is_none());
        assert!((sma.update(3.0).unwrap() - 2.0).abs() < 1e-12);
        assert!((sma.update(10.0).unwrap() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn population_stddev() {
        let mut sma = Sma::new(4);
        for v in [2.0, 4.0, 4.0, 6.0] {
            sma.update(v);
        }
        // mean 4, squared diffs 4+0+0+4 over 4
        assert!((sma.stddev().unwrap() - 2.0_f64.sqrt()).abs() < 1e-12);
    }
}
