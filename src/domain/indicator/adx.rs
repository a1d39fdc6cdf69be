//! ADX (Average Directional Index), Wilder.
//!
//! 1. TR, +DM and -DM from consecutive bars
//! 2. Running Wilder sums: S = S_prev - S_prev/n + x
//! 3. ±DI = 100 * S(±DM) / S(TR), or 0 when S(TR) is ~0
//! 4. DX = 100 * |+DI - -DI| / (+DI + -DI), or 0 when the sum is ~0
//! 5. ADX = mean of the first n DX values, then (ADX_prev * (n-1) + DX) / n

use crate::domain::bar::Bar;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdxOutput {
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
}

#[derive(Debug, Clone)]
pub struct Adx {
    period: usize,
    prev: Option<(f64, f64, f64)>,
    tr: f64,
    plus_dm: f64,
    minus_dm: f64,
    dx_seed: Vec<f64>,
    adx: Option<f64>,
    current: Option<AdxOutput>,
}

impl Adx {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Adx {
            period,
            prev: None,
            tr: 0.0,
            plus_dm: 0.0,
            minus_dm: 0.0,
            dx_seed: Vec::with_capacity(period),
            adx: None,
            current: None,
        }
    }

    fn smooth(&self, prev: f64, value: f64) -> f64 {
        prev - prev / self.period as f64 + value
    }

    pub fn update(&mut self, bar: &Bar) -> Option<AdxOutput> {
        let Some((prev_high, prev_low, prev_close)) =
            self.prev.replace((bar.high, bar.low, bar.close))
        else {
            return None;
        };

        let move_up = bar.high - prev_high;
        let move_down = prev_low - bar.low;
        let plus_dm = if move_up > move_down && move_up > 0.0 {
            move_up
        } else {
            0.0
        };
        let minus_dm = if move_down > move_up && move_down > 0.0 {
            move_down
        } else {
            0.0
        };

        self.tr = self.smooth(self.tr, bar.true_range(prev_close));
        self.plus_dm = self.smooth(self.plus_dm, plus_dm);
        self.minus_dm = self.smooth(self.minus_dm, minus_dm);

        let (plus_di, minus_di) = if self.tr > EPSILON {
            (
                100.0 * self.plus_dm / self.tr,
                100.0 * self.minus_dm / self.tr,
            )
        } else {
            (0.0, 0.0)
        };

        let di_sum = plus_di + minus_di;
        let dx = if di_sum > EPSILON {
            100.0 * (plus_di - minus_di).abs() / di_sum
        } else {
            0.0
        };

        let n = self.period as f64;
        self.adx = match self.adx {
            Some(prev) => Some((prev * (n - 1.0) + dx) / n),
            None => {
                self.dx_seed.push(dx);
                (self.dx_seed.len() == self.period)
                    .then(|| self.dx_seed.iter().sum::<f64>() / n)
            }
        };

        self.current = self.adx.map(|adx| AdxOutput {
            adx,
            plus_di,
            minus_di,
        });
        self.current
    }

    pub fn value(&self) -> Option<AdxOutput> {
        self.current
    }
}
