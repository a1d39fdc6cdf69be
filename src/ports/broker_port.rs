//! Pull-style broker port trait.
//!
//! Calls are blocking; the live runtime wraps them in bounded timeouts.

use crate::domain::error::TraderError;

/// Latest known quote. Missing fields mean the source had nothing to report.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub price: Option<f64>,
    pub cumulative_volume: Option<f64>,
}

/// An externally known open position; `size` is signed (short < 0).
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerPosition {
    pub symbol: String,
    pub size: f64,
    pub price: f64,
}

pub trait BrokerPort: Send + Sync {
    fn latest_quote(&self, symbol: &str) -> Result<Option<Quote>, TraderError>;

    fn cash(&self) -> Result<Option<f64>, TraderError>;

    fn positions(&self) -> Result<Vec<BrokerPosition>, TraderError>;
}
