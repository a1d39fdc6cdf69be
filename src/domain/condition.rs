//! Condition AST.
//!
//! - `Target`: what an indicator is compared against
//! - `Condition`: a comparison or a crossover, bound to one timeframe
//!
//! A strategy holds ordered lists of conditions; a list is satisfied only
//! when every member is.

use std::fmt;

use crate::domain::bar::PriceField;
use crate::domain::indicator::{IndicatorKey, IndicatorRef, IndicatorSpec};
use crate::domain::timeframe::TimeframeName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compare {
    Above,
    Below,
    Between,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Data(PriceField),
    Indicator(IndicatorRef),
    Value(f64),
    Range(f64, f64),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Data(field) => write!(f, "{field}"),
            Target::Indicator(r) => write!(f, "{r}"),
            Target::Value(v) => write!(f, "{v}"),
            Target::Range(lo, hi) => write!(f, "{lo},{hi}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrossDirection {
    Over,
    Under,
}

impl CrossDirection {
    pub fn keyword(&self) -> &'static str {
        match self {
            CrossDirection::Over => "crossover",
            CrossDirection::Under => "crossunder",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Comparison {
        timeframe: TimeframeName,
        indicator: IndicatorRef,
        compare: Compare,
        target: Target,
    },
    Cross {
        timeframe: TimeframeName,
        fast: IndicatorRef,
        slow: IndicatorRef,
        direction: CrossDirection,
    },
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Comparison {
                timeframe,
                indicator,
                compare,
                target,
            } => match (compare, target) {
                (Compare::Between, Target::Range(lo, hi)) => {
                    write!(f, "{timeframe}: {indicator} between {lo}, {hi}")
                }
                (Compare::Below, _) => write!(f, "{timeframe}: {indicator} < {target}"),
                _ => write!(f, "{timeframe}: {indicator} > {target}"),
            },
            Condition::Cross {
                timeframe,
                fast,
                slow,
                direction,
            } => write!(f, "{timeframe}: {}({fast}, {slow})", direction.keyword()),
        }
    }
}

/// Identity of one synthetic cross series. Crossover and crossunder of the
/// same pair share a series.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CrossKey {
    pub timeframe: TimeframeName,
    pub fast: IndicatorRef,
    pub slow: IndicatorRef,
}

impl fmt::Display for CrossKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_cross_{}_vs_{}",
            self.timeframe, self.fast, self.slow
        )
    }
}

impl Condition {
    pub fn timeframe(&self) -> TimeframeName {
        match self {
            Condition::Comparison { timeframe, .. } | Condition::Cross { timeframe, .. } => {
                *timeframe
            }
        }
    }

    /// Every indicator instance this condition reads.
    pub fn indicator_keys(&self) -> Vec<IndicatorKey> {
        let key = |timeframe: TimeframeName, spec: &IndicatorSpec| IndicatorKey {
            timeframe,
            spec: spec.clone(),
        };
        match self {
            Condition::Comparison {
                timeframe,
                indicator,
                target,
                ..
            } => {
                let mut keys = vec![key(*timeframe, &indicator.spec)];
                if let Target::Indicator(other) = target {
                    keys.push(key(*timeframe, &other.spec));
                }
                keys
            }
            Condition::Cross {
                timeframe,
                fast,
                slow,
                ..
            } => vec![key(*timeframe, &fast.spec), key(*timeframe, &slow.spec)],
        }
    }

    pub fn cross_key(&self) -> Option<CrossKey> {
        match self {
            Condition::Cross {
                timeframe,
                fast,
                slow,
                ..
            } => Some(CrossKey {
                timeframe: *timeframe,
                fast: fast.clone(),
                slow: slow.clone(),
            }),
            Condition::Comparison { .. } => None,
        }
    }
}
