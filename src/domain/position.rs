//! Position tracking.
//!
//! A `Position` is owned by one orchestrator and changes only through the
//! methods here: open, trail, reset of exit levels, close.

use chrono::NaiveDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn from_signed(size: f64) -> Option<Self> {
        if size > 0.0 {
            Some(Side::Long)
        } else if size < 0.0 {
            Some(Side::Short)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        })
    }
}

/// Stop and target levels for an entry at `price`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitLevels {
    pub stop: f64,
    pub target: f64,
    pub risk_per_share: f64,
}

impl ExitLevels {
    pub fn zero() -> Self {
        ExitLevels {
            stop: 0.0,
            target: 0.0,
            risk_per_share: 0.0,
        }
    }

    /// stop = price ∓ risk, target = price ± tp_atr × tp_multiplier
    pub fn compute(side: Side, price: f64, risk_per_share: f64, target_distance: f64) -> Self {
        let sign = side.sign();
        ExitLevels {
            stop: price - sign * risk_per_share,
            target: price + sign * target_distance,
            risk_per_share,
        }
    }

    pub fn is_set(&self) -> bool {
        self.stop != 0.0 && self.target != 0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    /// Always positive.
    pub size: f64,
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    pub stop_price: f64,
    pub target_price: f64,
    pub risk_per_share: f64,
}

impl Position {
    pub fn open(
        symbol: &str,
        side: Side,
        size: f64,
        entry_price: f64,
        entry_time: NaiveDateTime,
        levels: ExitLevels,
    ) -> Self {
        Position {
            symbol: symbol.to_string(),
            side,
            size: size.abs(),
            entry_price,
            entry_time,
            stop_price: levels.stop,
            target_price: levels.target,
            risk_per_share: levels.risk_per_share,
        }
    }

    pub fn signed_size(&self) -> f64 {
        self.side.sign() * self.size
    }

    pub fn has_exit_levels(&self) -> bool {
        self.stop_price != 0.0 && self.target_price != 0.0
    }

    pub fn set_exit_levels(&mut self, levels: ExitLevels) {
        self.stop_price = levels.stop;
        self.target_price = levels.target;
        self.risk_per_share = levels.risk_per_share;
    }

    /// Move the stop to `close ∓ risk_per_share` if that is more favourable.
    /// Returns the new stop when it moved.
    pub fn trail(&mut self, close: f64) -> Option<f64> {
        if self.risk_per_share <= 0.0 {
            return None;
        }
        let candidate = close - self.side.sign() * self.risk_per_share;
        let improves = match self.side {
            Side::Long => candidate > self.stop_price,
            Side::Short => candidate < self.stop_price,
        };
        if improves {
            self.stop_price = candidate;
            Some(candidate)
        } else {
            None
        }
    }

    pub fn should_stop_loss(&self, price: f64) -> bool {
        if self.stop_price == 0.0 {
            return false;
        }
        match self.side {
            Side::Long => price <= self.stop_price,
            Side::Short => price >= self.stop_price,
        }
    }

    pub fn should_take_profit(&self, price: f64) -> bool {
        if self.target_price == 0.0 {
            return false;
        }
        match self.side {
            Side::Long => price >= self.target_price,
            Side::Short => price <= self.target_price,
        }
    }

    /// Close the position at `exit_price`.
    pub fn close(
        self,
        exit_price: f64,
        exit_time: NaiveDateTime,
        commission: f64,
        exit_reason: ExitReason,
        entry_reason: String,
    ) -> ClosedTrade {
        let pnl = self.signed_size() * (exit_price - self.entry_price) - commission;
        ClosedTrade {
            symbol: self.symbol,
            side: self.side,
            size: self.size,
            entry_price: self.entry_price,
            exit_price,
            entry_time: self.entry_time,
            exit_time,
            pnl,
            exit_reason,
            entry_reason,
        }
    }

    pub fn to_record(&self) -> PersistedPositionRecord {
        PersistedPositionRecord {
            symbol: self.symbol.clone(),
            size: self.signed_size(),
            price: self.entry_price,
            entry_time: self.entry_time,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    Reconciled,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ExitReason::TakeProfit => "take-profit",
            ExitReason::StopLoss => "stop-loss",
            ExitReason::Reconciled => "reconciled",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub symbol: String,
    pub side: Side,
    pub size: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    pub pnl: f64,
    pub exit_reason: ExitReason,
    pub entry_reason: String,
}

/// Durable mirror of an open position; `size` is signed (short < 0).
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedPositionRecord {
    pub symbol: String,
    pub size: f64,
    pub price: f64,
    pub entry_time: NaiveDateTime,
}
