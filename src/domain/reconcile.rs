//! Broker-vs-engine position reconciliation.
//!
//! The broker is the source of truth for live state.

use crate::domain::position::Position;
use crate::ports::broker_port::BrokerPosition;

pub(crate) const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileAction {
    InSync,
    /// Broker holds a position the engine does not know about.
    Inject { size: f64, price: f64 },
    /// Engine believes in a position the broker does not hold.
    Flatten,
    /// Both hold one but size or price differ.
    Overwrite { size: f64, price: f64 },
}

/// Decide how to bring `internal` in line with `broker`. Sizes are signed.
pub fn plan(internal: Option<&Position>, broker: Option<&BrokerPosition>) -> ReconcileAction {
    let broker = broker.filter(|b| b.size.abs() > EPSILON);
    match (internal, broker) {
        (None, None) => ReconcileAction::InSync,
        (None, Some(b)) => ReconcileAction::Inject {
            size: b.size,
            price: b.price,
        },
        (Some(_), None) => ReconcileAction::Flatten,
        (Some(p), Some(b)) => {
            let same_size = (p.signed_size() - b.size).abs() <= EPSILON;
            let same_price = (p.entry_price - b.price).abs() <= EPSILON;
            if same_size && same_price {
                ReconcileAction::InSync
            } else {
                ReconcileAction::Overwrite {
                    size: b.size,
                    price: b.price,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::{ExitLevels, Side};
    use chrono::NaiveDate;

    fn internal(size: f64, price: f64) -> Position {
        let side = Side::from_signed(size).unwrap();
        Position::open(
            "ABC",
            side,
            size.abs(),
            price,
            NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            ExitLevels::zero(),
        )
    }

    fn broker(size: f64, price: f64) -> BrokerPosition {
        BrokerPosition {
            symbol: "ABC".into(),
            size,
            price,
        }
    }

    #[test]
    fn flat_both_sides() {
        assert_eq!(plan(None, None), ReconcileAction::InSync);
        assert_eq!(plan(None, Some(&broker(0.0, 10.0))), ReconcileAction::InSync);
    }

    #[test]
    fn broker_only_injects() {
        assert_eq!(
            plan(None, Some(&broker(100.0, 50.0))),
            ReconcileAction::Inject {
                size: 100.0,
                price: 50.0
            }
        );
    }

    #[test]
    fn engine_only_flattens() {
        assert_eq!(
            plan(Some(&internal(100.0, 50.0)), None),
            ReconcileAction::Flatten
        );
    }

    #[test]
    fn matching_within_epsilon_is_in_sync() {
        let pos = internal(-100.0, 50.0);
        assert_eq!(
            plan(Some(&pos), Some(&broker(-100.0, 50.0 + 1e-12))),
            ReconcileAction::InSync
        );
    }

    #[test]
    fn differing_size_overwrites() {
        let pos = internal(100.0, 50.0);
        assert_eq!(
            plan(Some(&pos), Some(&broker(-100.0, 50.0))),
            ReconcileAction::Overwrite {
                size: -100.0,
                price: 50.0
            }
        );
    }
}
