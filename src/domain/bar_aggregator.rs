//! Tick to base-bar aggregation.
//!
//! Ticks carry cumulative session volume; each bar's volume is the sum of the
//! per-tick deltas that landed in its bucket.

use chrono::NaiveDateTime;

use super::bar::Bar;
use super::timeframe::TimeframeDef;

/// A single pulled quote. Either field may be missing when the source had
/// nothing to report.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub timestamp: NaiveDateTime,
    pub price: Option<f64>,
    pub cumulative_volume: Option<f64>,
}

#[derive(Debug)]
pub struct BarAggregator {
    timeframe: TimeframeDef,
    current: Option<Bar>,
    last_emitted: Option<NaiveDateTime>,
    last_cumulative: f64,
}

impl BarAggregator {
    pub fn new(timeframe: TimeframeDef) -> Self {
        BarAggregator {
            timeframe,
            current: None,
            last_emitted: None,
            last_cumulative: 0.0,
        }
    }

    /// Feed one tick. Returns the previous bar when this tick opens a new bucket.
    pub fn update(&mut self, tick: &Tick) -> Option<Bar> {
        let (Some(price), Some(cumulative)) = (tick.price, tick.cumulative_volume) else {
            return None;
        };

        let bucket = self.timeframe.bucket_start(tick.timestamp);
        if self.last_emitted.is_some_and(|emitted| bucket <= emitted) {
            return None;
        }
        if self.current.as_ref().is_some_and(|bar| bucket < bar.timestamp) {
            return None;
        }

        let volume = self.volume_delta(cumulative);

        match self.current.as_mut() {
            Some(bar) if bar.timestamp == bucket => {
                bar.high = bar.high.max(price);
                bar.low = bar.low.min(price);
                bar.close = price;
                bar.volume += volume;
                None
            }
            _ => {
                let completed = self.current.replace(Bar::flat(bucket, price, volume));
                if let Some(ref bar) = completed {
                    self.last_emitted = Some(bar.timestamp);
                }
                completed
            }
        }
    }

    /// Force-emit the bar in progress and reset the volume baseline.
    pub fn flush(&mut self) -> Option<Bar> {
        self.last_cumulative = 0.0;
        let completed = self.current.take();
        if let Some(ref bar) = completed {
            self.last_emitted = Some(bar.timestamp);
        }
        completed
    }

    pub fn in_progress(&self) -> Option<&Bar> {
        self.current.as_ref()
    }

    fn volume_delta(&mut self, cumulative: f64) -> f64 {
        let delta = if self.last_cumulative > 0.0 && cumulative >= self.last_cumulative {
            cumulative - self.last_cumulative
        } else {
            cumulative
        };
        self.last_cumulative = cumulative;
        delta
    }
}
