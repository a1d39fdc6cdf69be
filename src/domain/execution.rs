//! Simulated fills: slippage, commission and cash.
//!
//! Cash moves by commissions and realized PnL only; notional is checked
//! against available cash before an entry is accepted.

use crate::domain::order::OrderSide;

/// Fill simulation parameters. Both rates are percentages.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    pub commission_pct: f64,
    pub slippage_pct: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            commission_pct: 0.0,
            slippage_pct: 0.02,
        }
    }
}

/// trade_value * pct / 100
pub fn calculate_commission(trade_value: f64, config: &ExecutionConfig) -> f64 {
    trade_value.abs() * config.commission_pct / 100.0
}

/// Buys fill above the market price, sells below.
pub fn apply_slippage(market_price: f64, side: OrderSide, slippage_pct: f64) -> f64 {
    match side {
        OrderSide::Buy => market_price * (1.0 + slippage_pct / 100.0),
        OrderSide::Sell => market_price * (1.0 - slippage_pct / 100.0),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub price: f64,
    pub size: f64,
    pub commission: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FillResult {
    Filled(Fill),
    Rejected { reason: String },
}

/// Per-symbol cash ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub cash: f64,
    pub realized_pnl: f64,
    pub commissions: f64,
}

impl Account {
    pub fn new(cash: f64) -> Self {
        Account {
            cash,
            realized_pnl: 0.0,
            commissions: 0.0,
        }
    }

    /// Fill a market entry at `market_price`, or reject it when the
    /// notional plus commission exceeds available cash.
    pub fn fill_entry(
        &mut self,
        side: OrderSide,
        size: f64,
        market_price: f64,
        config: &ExecutionConfig,
    ) -> FillResult {
        let price = apply_slippage(market_price, side, config.slippage_pct);
        let notional = size * price;
        let commission = calculate_commission(notional, config);
        if notional + commission > self.cash {
            return FillResult::Rejected {
                reason: format!(
                    "insufficient cash: need {:.2}, have {:.2}",
                    notional + commission,
                    self.cash
                ),
            };
        }
        self.cash -= commission;
        self.commissions += commission;
        FillResult::Filled(Fill {
            price,
            size,
            commission,
        })
    }

    /// Fill an exit at `price`; `signed_size` is the position being closed.
    /// Market exits pass `slip = true`, resting limit/stop legs fill at their level.
    pub fn fill_exit(
        &mut self,
        signed_size: f64,
        entry_price: f64,
        price: f64,
        slip: bool,
        config: &ExecutionConfig,
    ) -> Fill {
        let side = if signed_size > 0.0 {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        };
        let price = if slip {
            apply_slippage(price, side, config.slippage_pct)
        } else {
            price
        };
        let commission = calculate_commission(signed_size * price, config);
        let gross = signed_size * (price - entry_price);
        self.cash += gross - commission;
        self.realized_pnl += gross;
        self.commissions += commission;
        Fill {
            price,
            size: signed_size.abs(),
            commission,
        }
    }
}
