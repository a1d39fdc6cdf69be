//! Strategy file loading.
//!
//! Turns the INI sections of a strategy file into a validated
//! [`StrategyDefinition`]. Every error here is fatal for the symbol the
//! strategy was meant for.

use crate::domain::condition::Condition;
use crate::domain::condition_parser::parse;
use crate::domain::error::TraderError;
use crate::domain::strategy::{ExitSpec, SizingSpec, StrategyDefinition, TradingMode};
use crate::domain::timeframe::{TimeUnit, TimeframeDef, TimeframeName, TimeframeSource};
use crate::ports::config_port::ConfigPort;

const DEFAULT_ATR_PERIOD: i64 = 14;

pub fn load_strategy(config: &dyn ConfigPort) -> Result<StrategyDefinition, TraderError> {
    let name = config
        .get_string("strategy", "name")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "unnamed".to_string());

    let timeframes = [
        load_timeframe(config, TimeframeName::Short)?,
        load_timeframe(config, TimeframeName::Medium)?,
        load_timeframe(config, TimeframeName::Long)?,
    ];
    validate_timeframes(&timeframes)?;

    let trading_mode = TradingMode {
        long_enabled: config.get_bool("strategy", "long_enabled", true),
        short_enabled: config.get_bool("strategy", "short_enabled", true),
    };
    let entry_long = load_conditions(config, "long")?;
    let entry_short = load_conditions(config, "short")?;
    validate_entries(&entry_long, &entry_short, trading_mode)?;

    let strategy = StrategyDefinition {
        name,
        timeframes,
        entry_long,
        entry_short,
        stop_loss: load_exit(config, "stop_loss")?,
        take_profit: load_exit(config, "take_profit")?,
        sizing: load_sizing(config)?,
        trading_mode,
    };
    Ok(strategy)
}

fn timeframe_section(name: TimeframeName) -> String {
    format!("timeframe.{}", name)
}

fn load_timeframe(
    config: &dyn ConfigPort,
    name: TimeframeName,
) -> Result<TimeframeDef, TraderError> {
    let section = timeframe_section(name);

    let unit_str = config
        .get_string(&section, "unit")
        .ok_or_else(|| TraderError::ConfigMissing {
            section: section.clone(),
            key: "unit".to_string(),
        })?;
    let unit = TimeUnit::from_name(&unit_str.trim().to_lowercase()).ok_or_else(|| {
        TraderError::ConfigInvalid {
            section: section.clone(),
            key: "unit".to_string(),
            reason: format!(
                "unknown unit '{}', expected minutes, hours or days",
                unit_str.trim()
            ),
        }
    })?;

    let multiplier = config.get_int(&section, "multiplier", 0);
    if multiplier < 1 || multiplier > i64::from(u32::MAX) {
        return Err(TraderError::ConfigInvalid {
            section,
            key: "multiplier".to_string(),
            reason: "multiplier must be a positive integer".to_string(),
        });
    }

    let source = match config
        .get_string(&section, "source")
        .map(|s| s.trim().to_lowercase())
        .as_deref()
    {
        None | Some("") | Some("resample") => TimeframeSource::Resample,
        Some("direct") => {
            let pattern = config
                .get_string(&section, "file_pattern")
                .filter(|p| !p.trim().is_empty())
                .ok_or_else(|| TraderError::ConfigMissing {
                    section: section.clone(),
                    key: "file_pattern".to_string(),
                })?;
            TimeframeSource::Direct {
                file_pattern: pattern.trim().to_string(),
            }
        }
        Some(other) => {
            return Err(TraderError::ConfigInvalid {
                section,
                key: "source".to_string(),
                reason: format!("unknown source '{}', expected resample or direct", other),
            });
        }
    };

    let mut def = TimeframeDef::new(name, unit, multiplier as u32);
    def.source = source;
    Ok(def)
}

/// The base feed is never resampled, and resampled horizons must tile it.
fn validate_timeframes(timeframes: &[TimeframeDef; 3]) -> Result<(), TraderError> {
    let base = &timeframes[0];
    if base.source != TimeframeSource::Resample {
        return Err(TraderError::ConfigInvalid {
            section: timeframe_section(TimeframeName::Short),
            key: "source".to_string(),
            reason: "the short timeframe is the base feed and cannot be direct".to_string(),
        });
    }
    let base_secs = base.interval().num_seconds();
    for tf in &timeframes[1..] {
        let secs = tf.interval().num_seconds();
        if secs < base_secs {
            return Err(TraderError::ConfigInvalid {
                section: timeframe_section(tf.name),
                key: "multiplier".to_string(),
                reason: format!("{} is shorter than the base {}", tf.describe(), base.describe()),
            });
        }
        if tf.source == TimeframeSource::Resample && secs % base_secs != 0 {
            return Err(TraderError::ConfigInvalid {
                section: timeframe_section(tf.name),
                key: "multiplier".to_string(),
                reason: format!(
                    "{} is not a whole multiple of the base {}",
                    tf.describe(),
                    base.describe()
                ),
            });
        }
    }
    Ok(())
}

/// Reads `<side>_1`, `<side>_2`, ... from `[entry]`. Numbering must be
/// contiguous; a key past the first gap is an error rather than silently
/// ignored.
fn load_conditions(config: &dyn ConfigPort, side: &str) -> Result<Vec<Condition>, TraderError> {
    let mut conditions = Vec::new();
    for n in 1.. {
        let key = format!("{}_{}", side, n);
        let Some(input) = config.get_string("entry", &key) else {
            break;
        };
        let condition = parse(&input).map_err(|source| TraderError::ConditionParse {
            key: format!("entry.{}", key),
            input: input.clone(),
            source,
        })?;
        conditions.push(condition);
    }

    let prefix = format!("{}_", side);
    let stranded = config.keys("entry").into_iter().find(|key| {
        key.strip_prefix(&prefix)
            .and_then(|n| n.parse::<usize>().ok())
            .is_some_and(|n| n == 0 || n > conditions.len())
    });
    if let Some(key) = stranded {
        return Err(TraderError::ConfigInvalid {
            section: "entry".to_string(),
            key,
            reason: format!(
                "{} conditions must be numbered {}1, {}2, ... without gaps",
                side, prefix, prefix
            ),
        });
    }
    Ok(conditions)
}

fn validate_entries(
    entry_long: &[Condition],
    entry_short: &[Condition],
    mode: TradingMode,
) -> Result<(), TraderError> {
    if !mode.long_enabled && !mode.short_enabled {
        return Err(TraderError::ConfigInvalid {
            section: "strategy".to_string(),
            key: "long_enabled".to_string(),
            reason: "at least one of long_enabled and short_enabled must be true".to_string(),
        });
    }
    let usable = (mode.long_enabled && !entry_long.is_empty())
        || (mode.short_enabled && !entry_short.is_empty());
    if !usable {
        let key = if mode.long_enabled { "long_1" } else { "short_1" };
        return Err(TraderError::ConfigMissing {
            section: "entry".to_string(),
            key: key.to_string(),
        });
    }
    Ok(())
}

fn load_exit(config: &dyn ConfigPort, prefix: &str) -> Result<ExitSpec, TraderError> {
    let tf_key = format!("{}_timeframe", prefix);
    let timeframe = match config.get_string("exit", &tf_key) {
        None => TimeframeName::Short,
        Some(s) => TimeframeName::from_name(&s.trim().to_lowercase()).ok_or_else(|| {
            TraderError::ConfigInvalid {
                section: "exit".to_string(),
                key: tf_key.clone(),
                reason: format!("unknown timeframe '{}'", s.trim()),
            }
        })?,
    };

    let period_key = format!("{}_atr_period", prefix);
    let atr_period = config.get_int("exit", &period_key, DEFAULT_ATR_PERIOD);
    if atr_period < 1 {
        return Err(TraderError::ConfigInvalid {
            section: "exit".to_string(),
            key: period_key,
            reason: "atr_period must be at least 1".to_string(),
        });
    }

    let mult_key = format!("{}_multiplier", prefix);
    if config.get_string("exit", &mult_key).is_none() {
        return Err(TraderError::ConfigMissing {
            section: "exit".to_string(),
            key: mult_key,
        });
    }
    let multiplier = config.get_double("exit", &mult_key, 0.0);
    if multiplier <= 0.0 {
        return Err(TraderError::ConfigInvalid {
            section: "exit".to_string(),
            key: mult_key,
            reason: "multiplier must be positive".to_string(),
        });
    }

    Ok(ExitSpec {
        timeframe,
        atr_period: atr_period as usize,
        multiplier,
    })
}

fn load_sizing(config: &dyn ConfigPort) -> Result<SizingSpec, TraderError> {
    let defaults = SizingSpec::default();
    let risk_per_trade = config.get_double("sizing", "risk_per_trade", defaults.risk_per_trade);
    if risk_per_trade <= 0.0 || risk_per_trade > 1.0 {
        return Err(TraderError::ConfigInvalid {
            section: "sizing".to_string(),
            key: "risk_per_trade".to_string(),
            reason: "risk_per_trade must be between 0 and 1".to_string(),
        });
    }
    let max_notional_per_trade = config.get_double(
        "sizing",
        "max_notional_per_trade",
        defaults.max_notional_per_trade,
    );
    if max_notional_per_trade <= 0.0 {
        return Err(TraderError::ConfigInvalid {
            section: "sizing".to_string(),
            key: "max_notional_per_trade".to_string(),
            reason: "max_notional_per_trade must be positive".to_string(),
        });
    }
    Ok(SizingSpec {
        risk_per_trade,
        max_notional_per_trade,
    })
}
