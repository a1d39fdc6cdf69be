//! Stochastic oscillator.
//!
//! %K = 100 * (close - lowest_low) / (highest_high - lowest_low) over `period`
//! %D = SMA(%K, period_dfast)
//!
//! When the window has no range both lines read 50.0.

use std::collections::VecDeque;

use super::sma::Sma;
use crate::domain::bar::Bar;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StochasticOutput {
    pub k: f64,
    pub d: f64,
}

#[derive(Debug, Clone)]
pub struct Stochastic {
    period: usize,
    window: VecDeque<(f64, f64)>,
    d: Sma,
    current: Option<StochasticOutput>,
}

const FLAT_RANGE: f64 = 50.0;

impl Stochastic {
    pub fn new(period: usize, period_dfast: usize) -> Self {
        Stochastic {
            period: period.max(1),
            window: VecDeque::with_capacity(period.max(1)),
            d: Sma::new(period_dfast),
            current: None,
        }
    }

    pub fn update(&mut self, bar: &Bar) -> Option<StochasticOutput> {
        self.window.push_back((bar.high, bar.low));
        if self.window.len() > self.period {
            self.window.pop_front();
        }
        if self.window.len() < self.period {
            return None;
        }

        let highest = self
            .window
            .iter()
            .map(|(h, _)| *h)
            .fold(f64::NEG_INFINITY, f64::max);
        let lowest = self
            .window
            .iter()
            .map(|(_, l)| *l)
            .fold(f64::INFINITY, f64::min);
        let range = highest - lowest;

        self.current = if range.abs() < f64::EPSILON {
            self.d.update(FLAT_RANGE);
            Some(StochasticOutput {
                k: FLAT_RANGE,
                d: FLAT_RANGE,
            })
        } else {
            let k = 100.0 * (bar.close - lowest) / range;
            self.d.update(k).map(|d| StochasticOutput { k, d })
        };
        self.current
    }

    pub fn value(&self) -> Option<StochasticOutput> {
        self.current
    }
}
