//! Timeframe definitions and bucket arithmetic.

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};

/// The three synchronized horizons a strategy reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeframeName {
    Short,
    Medium,
    Long,
}

impl TimeframeName {
    pub const ALL: [TimeframeName; 3] =
        [TimeframeName::Short, TimeframeName::Medium, TimeframeName::Long];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "short" => Some(TimeframeName::Short),
            "medium" => Some(TimeframeName::Medium),
            "long" => Some(TimeframeName::Long),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeframeName::Short => "short",
            TimeframeName::Medium => "medium",
            TimeframeName::Long => "long",
        }
    }

    /// Single-letter tag used in justification strings.
    pub fn initial(&self) -> char {
        match self {
            TimeframeName::Short => 'S',
            TimeframeName::Medium => 'M',
            TimeframeName::Long => 'L',
        }
    }

    pub fn index(&self) -> usize {
        match self {
            TimeframeName::Short => 0,
            TimeframeName::Medium => 1,
            TimeframeName::Long => 2,
        }
    }
}

impl std::fmt::Display for TimeframeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "minutes" | "minute" => Some(TimeUnit::Minutes),
            "hours" | "hour" => Some(TimeUnit::Hours),
            "days" | "day" => Some(TimeUnit::Days),
            _ => None,
        }
    }
}

/// Where a timeframe's bars come from.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeframeSource {
    Resample,
    /// An independent feed; `file_pattern` contains `{symbol}`.
    Direct { file_pattern: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeframeDef {
    pub name: TimeframeName,
    pub unit: TimeUnit,
    pub multiplier: u32,
    pub source: TimeframeSource,
}

impl TimeframeDef {
    pub fn new(name: TimeframeName, unit: TimeUnit, multiplier: u32) -> Self {
        TimeframeDef {
            name,
            unit,
            multiplier,
            source: TimeframeSource::Resample,
        }
    }

    pub fn interval(&self) -> Duration {
        let n = i64::from(self.multiplier);
        match self.unit {
            TimeUnit::Minutes => Duration::minutes(n),
            TimeUnit::Hours => Duration::hours(n),
            TimeUnit::Days => Duration::days(n),
        }
    }

    /// Start of the bucket containing `ts`.
    ///
    /// Intraday buckets are counted from midnight of `ts`'s date so they line
    /// up with the wall clock. Day buckets are calendar dates.
    pub fn bucket_start(&self, ts: NaiveDateTime) -> NaiveDateTime {
        let midnight = ts.date().and_time(NaiveTime::MIN);
        match self.unit {
            TimeUnit::Days => midnight,
            TimeUnit::Minutes | TimeUnit::Hours => {
                let secs = i64::from(ts.num_seconds_from_midnight());
                let step = self.interval().num_seconds().max(1);
                midnight + Duration::seconds(secs - secs.rem_euclid(step))
            }
        }
    }

    pub fn describe(&self) -> String {
        let unit = match self.unit {
            TimeUnit::Minutes => "min",
            TimeUnit::Hours => "h",
            TimeUnit::Days => "d",
        };
        format!("{}{}", self.multiplier, unit)
    }
}
