//! Technical indicators.
//!
//! - `IndicatorSpec`: indicator identity + parameters (serves as HashMap key)
//! - `IndicatorField`: which output line of a multi-line indicator to read
//! - `IndicatorValue`: enum for the different output shapes
//! - `Indicator`: live incremental state, one variant per supported kind
//!
//! Every indicator is updated once per closed bar of its timeframe and reports
//! `None` until it has seen enough bars.

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod cross;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod stochastic;
pub mod vwap;

use std::fmt;

use chrono::Duration;

use crate::domain::bar::Bar;
use crate::domain::error::TraderError;
use crate::domain::timeframe::TimeframeName;

use adx::{Adx, AdxOutput};
use atr::Atr;
use bollinger::{Bollinger, BollingerOutput};
use ema::Ema;
use macd::{Macd, MacdOutput};
use rsi::Rsi;
use sma::Sma;
use stochastic::{Stochastic, StochasticOutput};
use vwap::Vwap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorSpec {
    Sma(usize),
    Ema(usize),
    Rsi(usize),
    Atr(usize),
    Adx(usize),
    Vwap,
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
    Stochastic {
        period: usize,
        period_dfast: usize,
    },
}

/// One `name=value` or positional argument from a strategy file.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Option<String>,
    pub value: f64,
}

impl Param {
    pub fn positional(value: f64) -> Self {
        Param { name: None, value }
    }

    pub fn named(name: &str, value: f64) -> Self {
        Param {
            name: Some(name.to_string()),
            value,
        }
    }
}

fn parameter_table(name: &str) -> Option<&'static [(&'static str, f64)]> {
    let table: &'static [(&'static str, f64)] = match name {
        "sma" | "ema" => &[("period", 20.0)],
        "rsi" | "atr" | "adx" => &[("period", 14.0)],
        "vwap" => &[],
        "macd" => &[
            ("fast", macd::DEFAULT_FAST as f64),
            ("slow", macd::DEFAULT_SLOW as f64),
            ("signal", macd::DEFAULT_SIGNAL as f64),
        ],
        "bollinger" => &[("period", 20.0), ("devfactor", 2.0)],
        "stochastic" => &[("period", 14.0), ("period_dfast", 3.0)],
        _ => return None,
    };
    Some(table)
}

fn invalid_param(name: &str, reason: String) -> TraderError {
    TraderError::ConfigInvalid {
        section: "indicator".into(),
        key: name.to_string(),
        reason,
    }
}

fn as_period(indicator: &str, param: &str, value: f64) -> Result<usize, TraderError> {
    if value < 1.0 || value.fract() != 0.0 {
        return Err(invalid_param(
            indicator,
            format!("{param} must be a positive integer, got {value}"),
        ));
    }
    Ok(value as usize)
}

impl IndicatorSpec {
    /// Resolve a kind name plus positional/named parameters into a spec.
    ///
    /// Positional parameters fill slots in declaration order; missing slots
    /// take their defaults.
    pub fn from_params(name: &str, params: &[Param]) -> Result<Self, TraderError> {
        let table = parameter_table(name).ok_or_else(|| TraderError::UnknownIndicator {
            name: name.to_string(),
        })?;
        let mut values: Vec<f64> = table.iter().map(|(_, default)| *default).collect();
        let mut next_positional = 0;

        for param in params {
            let slot = match &param.name {
                Some(key) => table.iter().position(|(n, _)| n == key).ok_or_else(|| {
                    invalid_param(name, format!("unknown parameter '{key}'"))
                })?,
                None => {
                    let slot = next_positional;
                    next_positional += 1;
                    slot
                }
            };
            if slot >= values.len() {
                return Err(invalid_param(
                    name,
                    format!("takes at most {} parameters", values.len()),
                ));
            }
            values[slot] = param.value;
        }

        let spec = match name {
            "sma" => IndicatorSpec::Sma(as_period(name, "period", values[0])?),
            "ema" => IndicatorSpec::Ema(as_period(name, "period", values[0])?),
            "rsi" => IndicatorSpec::Rsi(as_period(name, "period", values[0])?),
            "atr" => IndicatorSpec::Atr(as_period(name, "period", values[0])?),
            "adx" => IndicatorSpec::Adx(as_period(name, "period", values[0])?),
            "vwap" => IndicatorSpec::Vwap,
            "macd" => IndicatorSpec::Macd {
                fast: as_period(name, "fast", values[0])?,
                slow: as_period(name, "slow", values[1])?,
                signal: as_period(name, "signal", values[2])?,
            },
            "bollinger" => {
                if values[1] <= 0.0 {
                    return Err(invalid_param(name, "devfactor must be positive".into()));
                }
                IndicatorSpec::Bollinger {
                    period: as_period(name, "period", values[0])?,
                    stddev_mult_x100: (values[1] * 100.0).round() as u32,
                }
            }
            "stochastic" => IndicatorSpec::Stochastic {
                period: as_period(name, "period", values[0])?,
                period_dfast: as_period(name, "period_dfast", values[1])?,
            },
            _ => {
                return Err(TraderError::UnknownIndicator {
                    name: name.to_string(),
                });
            }
        };
        Ok(spec)
    }

    pub fn name(&self) -> &'static str {
        match self {
            IndicatorSpec::Sma(_) => "sma",
            IndicatorSpec::Ema(_) => "ema",
            IndicatorSpec::Rsi(_) => "rsi",
            IndicatorSpec::Atr(_) => "atr",
            IndicatorSpec::Adx(_) => "adx",
            IndicatorSpec::Vwap => "vwap",
            IndicatorSpec::Macd { .. } => "macd",
            IndicatorSpec::Bollinger { .. } => "bollinger",
            IndicatorSpec::Stochastic { .. } => "stochastic",
        }
    }

    /// Parameters as (name, rendered value), in declaration order.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            IndicatorSpec::Sma(p)
            | IndicatorSpec::Ema(p)
            | IndicatorSpec::Rsi(p)
            | IndicatorSpec::Atr(p)
            | IndicatorSpec::Adx(p) => vec![("period", p.to_string())],
            IndicatorSpec::Vwap => Vec::new(),
            IndicatorSpec::Macd { fast, slow, signal } => vec![
                ("fast", fast.to_string()),
                ("slow", slow.to_string()),
                ("signal", signal.to_string()),
            ],
            IndicatorSpec::Bollinger {
                period,
                stddev_mult_x100,
            } => vec![
                ("period", period.to_string()),
                ("devfactor", (f64::from(*stddev_mult_x100) / 100.0).to_string()),
            ],
            IndicatorSpec::Stochastic {
                period,
                period_dfast,
            } => vec![
                ("period", period.to_string()),
                ("period_dfast", period_dfast.to_string()),
            ],
        }
    }

    pub fn default_field(&self) -> IndicatorField {
        match self {
            IndicatorSpec::Macd { .. } => IndicatorField::MacdLine,
            IndicatorSpec::Bollinger { .. } => IndicatorField::BollingerMiddle,
            IndicatorSpec::Stochastic { .. } => IndicatorField::StochasticK,
            IndicatorSpec::Adx(_) => IndicatorField::AdxValue,
            _ => IndicatorField::Value,
        }
    }

    /// Look up an output line by its name for this kind.
    pub fn field_by_name(&self, field: &str) -> Option<IndicatorField> {
        let resolved = match (self, field) {
            (IndicatorSpec::Macd { .. }, "line" | "macd") => IndicatorField::MacdLine,
            (IndicatorSpec::Macd { .. }, "signal") => IndicatorField::MacdSignal,
            (IndicatorSpec::Macd { .. }, "histogram" | "histo") => IndicatorField::MacdHistogram,
            (IndicatorSpec::Bollinger { .. }, "upper" | "top") => IndicatorField::BollingerUpper,
            (IndicatorSpec::Bollinger { .. }, "middle" | "mid") => IndicatorField::BollingerMiddle,
            (IndicatorSpec::Bollinger { .. }, "lower" | "bot") => IndicatorField::BollingerLower,
            (IndicatorSpec::Stochastic { .. }, "k" | "perck") => IndicatorField::StochasticK,
            (IndicatorSpec::Stochastic { .. }, "d" | "percd") => IndicatorField::StochasticD,
            (IndicatorSpec::Adx(_), "adx") => IndicatorField::AdxValue,
            (IndicatorSpec::Adx(_), "plus_di" | "plusdi") => IndicatorField::PlusDi,
            (IndicatorSpec::Adx(_), "minus_di" | "minusdi") => IndicatorField::MinusDi,
            (
                IndicatorSpec::Sma(_)
                | IndicatorSpec::Ema(_)
                | IndicatorSpec::Rsi(_)
                | IndicatorSpec::Atr(_)
                | IndicatorSpec::Vwap,
                "value",
            ) => IndicatorField::Value,
            _ => return None,
        };
        Some(resolved)
    }
}

impl fmt::Display for IndicatorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self.params().into_iter().map(|(_, v)| v).collect();
        write!(f, "{}({})", self.name(), args.join(","))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorField {
    Value,
    MacdLine,
    MacdSignal,
    MacdHistogram,
    BollingerUpper,
    BollingerMiddle,
    BollingerLower,
    StochasticK,
    StochasticD,
    AdxValue,
    PlusDi,
    MinusDi,
}

impl IndicatorField {
    pub fn suffix(&self) -> Option<&'static str> {
        match self {
            IndicatorField::Value => None,
            IndicatorField::MacdLine => Some("line"),
            IndicatorField::MacdSignal => Some("signal"),
            IndicatorField::MacdHistogram => Some("histogram"),
            IndicatorField::BollingerUpper => Some("upper"),
            IndicatorField::BollingerMiddle => Some("middle"),
            IndicatorField::BollingerLower => Some("lower"),
            IndicatorField::StochasticK => Some("k"),
            IndicatorField::StochasticD => Some("d"),
            IndicatorField::AdxValue => Some("adx"),
            IndicatorField::PlusDi => Some("plus_di"),
            IndicatorField::MinusDi => Some("minus_di"),
        }
    }
}

/// An indicator plus the output line a condition reads from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndicatorRef {
    pub spec: IndicatorSpec,
    pub field: IndicatorField,
}

impl IndicatorRef {
    pub fn new(spec: IndicatorSpec) -> Self {
        let field = spec.default_field();
        IndicatorRef { spec, field }
    }
}

impl fmt::Display for IndicatorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.spec)?;
        if self.field != self.spec.default_field() {
            if let Some(suffix) = self.field.suffix() {
                write!(f, ".{suffix}")?;
            }
        }
        Ok(())
    }
}

/// Deduplication key: one live instance per (timeframe, spec).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndicatorKey {
    pub timeframe: TimeframeName,
    pub spec: IndicatorSpec,
}

impl fmt::Display for IndicatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut params = self.spec.params();
        params.sort_by(|a, b| a.0.cmp(b.0));
        write!(f, "{}_{}", self.timeframe, self.spec.name())?;
        for (name, value) in params {
            write!(f, "_{name}={value}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Macd(MacdOutput),
    Bollinger(BollingerOutput),
    Stochastic(StochasticOutput),
    Adx(AdxOutput),
}

impl IndicatorValue {
    pub fn field(&self, field: IndicatorField) -> Option<f64> {
        match (self, field) {
            (IndicatorValue::Simple(v), IndicatorField::Value) => Some(*v),
            (IndicatorValue::Macd(m), IndicatorField::MacdLine) => Some(m.line),
            (IndicatorValue::Macd(m), IndicatorField::MacdSignal) => Some(m.signal),
            (IndicatorValue::Macd(m), IndicatorField::MacdHistogram) => Some(m.histogram),
            (IndicatorValue::Bollinger(b), IndicatorField::BollingerUpper) => Some(b.upper),
            (IndicatorValue::Bollinger(b), IndicatorField::BollingerMiddle) => Some(b.middle),
            (IndicatorValue::Bollinger(b), IndicatorField::BollingerLower) => Some(b.lower),
            (IndicatorValue::Stochastic(s), IndicatorField::StochasticK) => Some(s.k),
            (IndicatorValue::Stochastic(s), IndicatorField::StochasticD) => Some(s.d),
            (IndicatorValue::Adx(a), IndicatorField::AdxValue) => Some(a.adx),
            (IndicatorValue::Adx(a), IndicatorField::PlusDi) => Some(a.plus_di),
            (IndicatorValue::Adx(a), IndicatorField::MinusDi) => Some(a.minus_di),
            _ => None,
        }
    }
}

/// Live indicator state built from an `IndicatorSpec`.
#[derive(Debug, Clone)]
pub enum Indicator {
    Sma(Sma),
    Ema(Ema),
    Rsi(Rsi),
    Atr(Atr),
    Adx(Adx),
    Vwap(Vwap),
    Macd(Macd),
    Bollinger(Bollinger),
    Stochastic(Stochastic),
}

impl Indicator {
    pub fn from_spec(spec: &IndicatorSpec) -> Self {
        Self::labelled(spec, Duration::zero())
    }

    /// `label_offset` is how far a bar's timestamp lies past its start.
    pub fn labelled(spec: &IndicatorSpec, label_offset: Duration) -> Self {
        match spec {
            IndicatorSpec::Sma(p) => Indicator::Sma(Sma::new(*p)),
            IndicatorSpec::Ema(p) => Indicator::Ema(Ema::new(*p)),
            IndicatorSpec::Rsi(p) => Indicator::Rsi(Rsi::new(*p)),
            IndicatorSpec::Atr(p) => Indicator::Atr(Atr::new(*p)),
            IndicatorSpec::Adx(p) => Indicator::Adx(Adx::new(*p)),
            IndicatorSpec::Vwap => Indicator::Vwap(Vwap::end_labelled(label_offset)),
            IndicatorSpec::Macd { fast, slow, signal } => {
                Indicator::Macd(Macd::new(*fast, *slow, *signal))
            }
            IndicatorSpec::Bollinger {
                period,
                stddev_mult_x100,
            } => Indicator::Bollinger(Bollinger::new(*period, *stddev_mult_x100)),
            IndicatorSpec::Stochastic {
                period,
                period_dfast,
            } => Indicator::Stochastic(Stochastic::new(*period, *period_dfast)),
        }
    }

    pub fn update(&mut self, bar: &Bar) {
        match self {
            Indicator::Sma(i) => {
                i.update(bar.close);
            }
            Indicator::Ema(i) => {
                i.update(bar.close);
            }
            Indicator::Rsi(i) => {
                i.update(bar.close);
            }
            Indicator::Atr(i) => {
                i.update(bar);
            }
            Indicator::Adx(i) => {
                i.update(bar);
            }
            Indicator::Vwap(i) => {
                i.update(bar);
            }
            Indicator::Macd(i) => {
                i.update(bar.close);
            }
            Indicator::Bollinger(i) => {
                i.update(bar.close);
            }
            Indicator::Stochastic(i) => {
                i.update(bar);
            }
        }
    }

    pub fn current(&self) -> Option<IndicatorValue> {
        match self {
            Indicator::Sma(i) => i.value().map(IndicatorValue::Simple),
            Indicator::Ema(i) => i.value().map(IndicatorValue::Simple),
            Indicator::Rsi(i) => i.value().map(IndicatorValue::Simple),
            Indicator::Atr(i) => i.value().map(IndicatorValue::Simple),
            Indicator::Vwap(i) => i.value().map(IndicatorValue::Simple),
            Indicator::Adx(i) => i.value().map(IndicatorValue::Adx),
            Indicator::Macd(i) => i.value().map(IndicatorValue::Macd),
            Indicator::Bollinger(i) => i.value().map(IndicatorValue::Bollinger),
            Indicator::Stochastic(i) => i.value().map(IndicatorValue::Stochastic),
        }
    }
}
