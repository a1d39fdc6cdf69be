//! Strategy definition.

use crate::domain::condition::{Condition, CrossKey};
use crate::domain::indicator::{IndicatorKey, IndicatorSpec};
use crate::domain::timeframe::{TimeframeDef, TimeframeName};

/// ATR-based distance for a stop-loss or take-profit.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitSpec {
    pub timeframe: TimeframeName,
    pub atr_period: usize,
    pub multiplier: f64,
}

impl ExitSpec {
    pub fn atr_key(&self) -> IndicatorKey {
        IndicatorKey {
            timeframe: self.timeframe,
            spec: IndicatorSpec::Atr(self.atr_period),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SizingSpec {
    /// Fraction of cash put at risk per trade.
    pub risk_per_trade: f64,
    pub max_notional_per_trade: f64,
}

impl Default for SizingSpec {
    fn default() -> Self {
        SizingSpec {
            risk_per_trade: 0.01,
            max_notional_per_trade: 10_000_000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingMode {
    pub long_enabled: bool,
    pub short_enabled: bool,
}

impl Default for TradingMode {
    fn default() -> Self {
        TradingMode {
            long_enabled: true,
            short_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyDefinition {
    pub name: String,
    /// Indexed by `TimeframeName::index()`; `[0]` is the base feed.
    pub timeframes: [TimeframeDef; 3],
    pub entry_long: Vec<Condition>,
    pub entry_short: Vec<Condition>,
    pub stop_loss: ExitSpec,
    pub take_profit: ExitSpec,
    pub sizing: SizingSpec,
    pub trading_mode: TradingMode,
}

impl StrategyDefinition {
    pub fn timeframe(&self, name: TimeframeName) -> &TimeframeDef {
        &self.timeframes[name.index()]
    }

    pub fn base(&self) -> &TimeframeDef {
        self.timeframe(TimeframeName::Short)
    }

    /// Every (timeframe, indicator) the strategy reads, including exit ATRs.
    /// May contain duplicates; the engine deduplicates.
    pub fn indicator_keys(&self) -> Vec<IndicatorKey> {
        let mut keys: Vec<IndicatorKey> = self
            .entry_long
            .iter()
            .chain(self.entry_short.iter())
            .flat_map(Condition::indicator_keys)
            .collect();
        keys.push(self.stop_loss.atr_key());
        keys.push(self.take_profit.atr_key());
        keys
    }

    pub fn cross_keys(&self) -> Vec<CrossKey> {
        self.entry_long
            .iter()
            .chain(self.entry_short.iter())
            .filter_map(Condition::cross_key)
            .collect()
    }
}
