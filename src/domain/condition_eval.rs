//! Condition evaluation against the live indicator set.
//!
//! # Evaluation Semantics
//!
//! - `>` / `<` are strict; `between` is strict on both ends
//! - crossover/crossunder read the signed cross series (+1 / -1)
//! - a not-ready indicator, or a timeframe with no bars yet, makes the
//!   condition false
//! - a list is satisfied only when non-empty and every member is true
//!
//! Satisfied conditions yield a justification such as
//! `S: rsi(14) [28.31] < [30.00]`; a list joins them with ` / `.

use crate::domain::condition::{Compare, Condition, CrossDirection, Target};
use crate::domain::indicator_engine::IndicatorEngine;
use crate::domain::position::Side;
use crate::domain::strategy::StrategyDefinition;

/// Entry decision for one bar.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub side: Side,
    pub justification: String,
}

/// Justification for `condition` when it holds on the current bar.
pub fn evaluate(condition: &Condition, engine: &IndicatorEngine) -> Option<String> {
    let timeframe = condition.timeframe();
    engine.last_bar(timeframe)?;
    let tag = timeframe.initial();

    match condition {
        Condition::Cross {
            fast,
            slow,
            direction,
            ..
        } => {
            let key = condition.cross_key()?;
            let wanted = match direction {
                CrossDirection::Over => 1,
                CrossDirection::Under => -1,
            };
            (engine.cross(&key)? == wanted)
                .then(|| format!("{tag}: {}({fast},{slow}) [true]", direction.keyword()))
        }
        Condition::Comparison {
            indicator,
            compare,
            target,
            ..
        } => {
            let value = engine.value(timeframe, indicator)?;
            let (holds, target_str) = match (compare, target) {
                (Compare::Between, Target::Range(lo, hi)) => (
                    *lo < value && value < *hi,
                    format!("[{lo:.2}, {hi:.2}]"),
                ),
                (Compare::Between, _) => return None,
                (op, target) => {
                    let (other, label) = resolve_target(target, condition, engine)?;
                    let holds = match op {
                        Compare::Above => value > other,
                        _ => value < other,
                    };
                    (holds, format!("{label}[{other:.2}]"))
                }
            };
            let op = match compare {
                Compare::Above => ">",
                Compare::Below => "<",
                Compare::Between => "between",
            };
            holds.then(|| format!("{tag}: {indicator} [{value:.2}] {op} {target_str}"))
        }
    }
}

fn resolve_target(
    target: &Target,
    condition: &Condition,
    engine: &IndicatorEngine,
) -> Option<(f64, String)> {
    let timeframe = condition.timeframe();
    match target {
        Target::Value(v) => Some((*v, String::new())),
        Target::Data(field) => {
            let bar = engine.last_bar(timeframe)?;
            Some((field.read(bar), format!("{field} ")))
        }
        Target::Indicator(other) => Some((engine.value(timeframe, other)?, format!("{other} "))),
        Target::Range(..) => None,
    }
}

/// AND over a condition list; the joined justification when all hold.
pub fn evaluate_all(conditions: &[Condition], engine: &IndicatorEngine) -> Option<String> {
    if conditions.is_empty() {
        return None;
    }
    let mut parts = Vec::with_capacity(conditions.len());
    for condition in conditions {
        parts.push(evaluate(condition, engine)?);
    }
    Some(parts.join(" / "))
}

/// Long is checked before short; a disabled side is never evaluated.
pub fn entry_signal(strategy: &StrategyDefinition, engine: &IndicatorEngine) -> Option<Signal> {
    let mode = strategy.trading_mode;
    if mode.long_enabled {
        if let Some(justification) = evaluate_all(&strategy.entry_long, engine) {
            return Some(Signal {
                side: Side::Long,
                justification,
            });
        }
    }
    if mode.short_enabled {
        if let Some(justification) = evaluate_all(&strategy.entry_short, engine) {
            return Some(Signal {
                side: Side::Short,
                justification,
            });
        }
    }
    None
}
