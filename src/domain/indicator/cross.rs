//! Signed crossover series between two indicator lines.
//!
//! +1 when fast - slow goes from <= 0 to > 0, -1 when it goes from >= 0 to < 0,
//! otherwise 0.

#[derive(Debug, Clone, Default)]
pub struct CrossSeries {
    prev_diff: Option<f64>,
    current: Option<i8>,
}

impl CrossSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed this bar's pair of values. Either side missing means not ready.
    pub fn update(&mut self, fast: Option<f64>, slow: Option<f64>) -> Option<i8> {
        let (Some(fast), Some(slow)) = (fast, slow) else {
            self.current = None;
            return None;
        };
        let diff = fast - slow;
        self.current = self.prev_diff.map(|prev| {
            if prev <= 0.0 && diff > 0.0 {
                1
            } else if prev >= 0.0 && diff < 0.0 {
                -1
            } else {
                0
            }
        });
        self.prev_diff = Some(diff);
        self.current
    }

    pub fn value(&self) -> Option<i8> {
        self.current
    }
}
