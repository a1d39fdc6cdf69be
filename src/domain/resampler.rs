//! Medium/long timeframe synthesis from base bars.

use std::collections::VecDeque;

use chrono::{Duration, NaiveDateTime};

use super::bar::Bar;
use super::timeframe::{TimeframeDef, TimeframeSource};

#[derive(Debug)]
enum Mode {
    Resample {
        bucket: Option<NaiveDateTime>,
        current: Option<Bar>,
    },
    Direct {
        pending: VecDeque<Bar>,
    },
}

/// Derives one higher timeframe from the base feed.
///
/// In resample mode a bucket is closed when the first base bar of a later
/// bucket arrives and is labelled with its end time. Empty buckets produce
/// nothing. In direct mode a preloaded feed is released bar by bar, each one
/// only once the base feed has reached its end.
#[derive(Debug)]
pub struct TimeframeResampler {
    timeframe: TimeframeDef,
    mode: Mode,
}

impl TimeframeResampler {
    pub fn resample(timeframe: TimeframeDef) -> Self {
        TimeframeResampler {
            timeframe,
            mode: Mode::Resample {
                bucket: None,
                current: None,
            },
        }
    }

    pub fn direct(timeframe: TimeframeDef, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        bars.dedup_by_key(|b| b.timestamp);
        TimeframeResampler {
            timeframe,
            mode: Mode::Direct {
                pending: bars.into(),
            },
        }
    }

    /// Build from the definition; direct feeds must be supplied preloaded.
    pub fn for_definition(timeframe: TimeframeDef, direct_bars: Option<Vec<Bar>>) -> Self {
        match (&timeframe.source, direct_bars) {
            (TimeframeSource::Direct { .. }, Some(bars)) => Self::direct(timeframe, bars),
            _ => Self::resample(timeframe),
        }
    }

    pub fn timeframe(&self) -> &TimeframeDef {
        &self.timeframe
    }

    /// Feed one completed base bar; returns the higher-timeframe bars it closes.
    pub fn on_base_bar(&mut self, base: &Bar, base_interval: Duration) -> Vec<Bar> {
        let interval = self.timeframe.interval();
        match &mut self.mode {
            Mode::Resample { bucket, current } => {
                let start = self.timeframe.bucket_start(base.timestamp);
                if let (Some(open), Some(bar)) = (*bucket, current.as_mut()) {
                    if open == start {
                        bar.merge(base);
                        return Vec::new();
                    }
                    if start < open {
                        return Vec::new();
                    }
                }
                let mut fresh = base.clone();
                fresh.timestamp = start + interval;
                let closed = current.replace(fresh);
                *bucket = Some(start);
                closed.into_iter().collect()
            }
            Mode::Direct { pending } => {
                let base_end = base.timestamp + base_interval;
                let mut released = Vec::new();
                while pending
                    .front()
                    .is_some_and(|bar| bar.timestamp + interval <= base_end)
                {
                    if let Some(bar) = pending.pop_front() {
                        released.push(bar);
                    }
                }
                released
            }
        }
    }

    /// Emit the trailing partial bucket at the end of a replay.
    pub fn flush(&mut self) -> Option<Bar> {
        match &mut self.mode {
            Mode::Resample { bucket, current } => {
                *bucket = None;
                current.take()
            }
            Mode::Direct { .. } => None,
        }
    }
}
