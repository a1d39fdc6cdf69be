//! Bollinger Bands.
//!
//! - Middle: SMA over n periods
//! - Upper/Lower: Middle ± (multiplier × population StdDev)
//!
//! Default parameters: period=20, multiplier=2.0

use super::sma::Sma;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerOutput {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

#[derive(Debug, Clone)]
pub struct Bollinger {
    sma: Sma,
    multiplier: f64,
}

impl Bollinger {
    pub fn new(period: usize, stddev_mult_x100: u32) -> Self {
        Bollinger {
            sma: Sma::new(period),
            multiplier: f64::from(stddev_mult_x100) / 100.0,
        }
    }

    pub fn update(&mut self, close: f64) -> Option<BollingerOutput> {
        self.sma.update(close);
        self.value()
    }

    pub fn value(&self) -> Option<BollingerOutput> {
        let middle = self.sma.value()?;
        let spread = self.multiplier * self.sma.stddev()?;
        Some(BollingerOutput {
            upper: middle + spread,
            middle,
            lower: middle - spread,
        })
    }
}
