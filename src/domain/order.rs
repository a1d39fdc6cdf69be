//! Orders, OCO exit pairs and risk sizing.

use crate::domain::bar::Bar;
use crate::domain::position::{ExitReason, Position, Side};
use crate::domain::strategy::SizingSpec;

const MIN_RISK: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Entry,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opening(side: Side) -> Self {
        match side {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    pub fn closing(side: Side) -> Self {
        match side {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trigger {
    Market,
    Limit,
    TrailingStop { trail: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingOrder {
    pub id: u64,
    pub kind: OrderKind,
    pub side: OrderSide,
    pub size: f64,
    pub price: Option<f64>,
    pub trigger: Trigger,
}

/// Monotonic order id source, one per orchestrator.
#[derive(Debug, Default)]
pub struct OrderIds {
    next: u64,
}

impl OrderIds {
    pub fn next_id(&mut self) -> u64 {
        self.next += 1;
        self.next
    }
}

/// Risk-bounded order size.
///
/// size = min(cash × risk_per_trade / risk_per_share, max_notional / price);
/// `None` when the risk distance is ~0 or the size comes out non-positive.
pub fn position_size(
    cash: f64,
    sizing: &SizingSpec,
    risk_per_share: f64,
    price: f64,
) -> Option<f64> {
    if risk_per_share < MIN_RISK || price <= 0.0 {
        return None;
    }
    let by_risk = cash * sizing.risk_per_trade / risk_per_share;
    let by_notional = sizing.max_notional_per_trade / price;
    let size = by_risk.min(by_notional);
    (size > 0.0).then_some(size)
}

/// Target limit plus trailing stop; the first to fill cancels the other.
#[derive(Debug, Clone, PartialEq)]
pub struct OcoPair {
    pub target: PendingOrder,
    pub stop: PendingOrder,
    side: Side,
}

impl OcoPair {
    pub fn for_position(position: &Position, ids: &mut OrderIds) -> Self {
        let side = OrderSide::closing(position.side);
        OcoPair {
            target: PendingOrder {
                id: ids.next_id(),
                kind: OrderKind::Exit,
                side,
                size: position.size,
                price: Some(position.target_price),
                trigger: Trigger::Limit,
            },
            stop: PendingOrder {
                id: ids.next_id(),
                kind: OrderKind::Exit,
                side,
                size: position.size,
                price: Some(position.stop_price),
                trigger: Trigger::TrailingStop {
                    trail: position.risk_per_share,
                },
            },
            side: position.side,
        }
    }

    pub fn stop_price(&self) -> Option<f64> {
        self.stop.price
    }

    pub fn target_price(&self) -> Option<f64> {
        self.target.price
    }

    pub fn restate_stop(&mut self, stop: f64) {
        self.stop.price = Some(stop);
    }

    /// Which leg, if any, fills within `bar`, and at what price.
    ///
    /// A gap through a level fills at the open. When both legs are inside
    /// the bar's range the stop wins.
    pub fn check(&self, bar: &Bar) -> Option<(ExitReason, f64)> {
        let stop = self.stop.price?;
        let target = self.target.price?;
        match self.side {
            Side::Long => {
                if bar.low <= stop {
                    Some((ExitReason::StopLoss, bar.open.min(stop)))
                } else if bar.high >= target {
                    Some((ExitReason::TakeProfit, bar.open.max(target)))
                } else {
                    None
                }
            }
            Side::Short => {
                if bar.high >= stop {
                    Some((ExitReason::StopLoss, bar.open.max(stop)))
                } else if bar.low <= target {
                    Some((ExitReason::TakeProfit, bar.open.min(target)))
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::ExitLevels;
    use chrono::NaiveDate;

    fn ts() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            timestamp: ts(),
            open,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    fn long_pair() -> OcoPair {
        let pos = Position::open(
            "X",
            Side::Long,
            10.0,
            100.0,
            ts(),
            ExitLevels::compute(Side::Long, 100.0, 5.0, 10.0),
        );
        OcoPair::for_position(&pos, &mut OrderIds::default())
    }

    #[test]
    fn sizing_example() {
        let sizing = SizingSpec {
            risk_per_trade: 0.01,
            max_notional_per_trade: 10_000_000.0,
        };
        // ATR 10 × multiplier 2
        let size = position_size(1_000_000.0, &sizing, 20.0, 100.0).unwrap();
        assert!((size - 500.0).abs() < 1e-9);
    }

    #[test]
    fn sizing_capped_by_notional() {
        let sizing = SizingSpec {
            risk_per_trade: 0.01,
            max_notional_per_trade: 20_000.0,
        };
        let size = position_size(1_000_000.0, &sizing, 20.0, 100.0).unwrap();
        assert!((size - 200.0).abs() < 1e-9);
    }

    #[test]
    fn sizing_skips_degenerate_risk() {
        let sizing = SizingSpec::default();
        assert!(position_size(1_000_000.0, &sizing, 0.0, 100.0).is_none());
        assert!(position_size(1_000_000.0, &sizing, 1e-12, 100.0).is_none());
        assert!(position_size(0.0, &sizing, 1.0, 100.0).is_none());
    }

    #[test]
    fn oco_legs_close_the_position() {
        let pair = long_pair();
        assert_eq!(pair.stop.side, OrderSide::Sell);
        assert_eq!(pair.target.trigger, Trigger::Limit);
        assert_eq!(pair.stop.trigger, Trigger::TrailingStop { trail: 5.0 });
        assert_ne!(pair.stop.id, pair.target.id);
    }

    #[test]
    fn oco_stop_wins_when_both_inside_bar() {
        let pair = long_pair();
        assert_eq!(
            pair.check(&bar(100.0, 111.0, 94.0, 100.0)),
            Some((ExitReason::StopLoss, 95.0))
        );
    }

    #[test]
    fn oco_target_and_gap_fills() {
        let pair = long_pair();
        assert_eq!(
            pair.check(&bar(101.0, 110.5, 99.0, 110.0)),
            Some((ExitReason::TakeProfit, 110.0))
        );
        assert_eq!(
            pair.check(&bar(90.0, 91.0, 89.0, 90.0)),
            Some((ExitReason::StopLoss, 90.0))
        );
        assert_eq!(pair.check(&bar(100.0, 104.0, 96.0, 101.0)), None);
    }
}
