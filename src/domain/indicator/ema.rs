//! Exponential Moving Average.
//!
//! k = 2/(n+1), seeded with the SMA of the first n inputs, then
//! EMA = x*k + EMA_prev*(1-k).

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    k: f64,
    seed_sum: f64,
    count: usize,
    value: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Ema {
            period,
            k: 2.0 / (period as f64 + 1.0),
            seed_sum: 0.0,
            count: 0,
            value: None,
        }
    }

    pub fn update(&mut self, input: f64) -> Option<f64> {
        match self.value {
            Some(prev) => self.value = Some(input * self.k + prev * (1.0 - self.k)),
            None => {
                self.seed_sum += input;
                self.count += 1;
                if self.count == self.period {
                    self.value = Some(self.seed_sum / self.period as f64);
                }
            }
        }
        self.value
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_warmup_and_seed() {
        let mut ema = Ema::new(3);
        assert!(ema.update(10.0).is_none());
        assert!(ema.update(20.0).is_none());
        assert!((ema.update(30.0).unwrap() - 20.0).abs() < 1e-12);
    }

    #[test]
    fn ema_smoothing() {
        let mut ema = Ema::new(3);
        for v in [10.0, 20.0, 30.0] {
            ema.update(v);
        }
        // k = 0.5: 40*0.5 + 20*0.5
        assert!((ema.update(40.0).unwrap() - 30.0).abs() < 1e-12);
    }
}
